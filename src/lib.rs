// settle-core: margin-exchange accounting, risk and settlement engine.
// risk-first architecture: health math and liquidation take priority.
// all computation is deterministic with no external I/O; the sequencer
// supplies time, prices and funding.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  fixed.rs: signed 18-decimal fixed point over i128
//   1.1  types.rs: primitives: ProductId, Subaccount, Timestamp
//   2.x  risk.rs: long/short x initial/maintenance weight curves
//   3.x  ledger.rs: spot balances, normalized interest accounting
//   4.x  perp.rs: perp positions, cumulative funding, pnl settlement
//   5.x  lp.rs: LP shares, constant-product swap pricing
//   6.x  health.rs: weighted account valuation, spread netting
//   7.x  config.rs: products, fees, penalties, spread pairs
//   8.x  engine/: core state, intents, errors and outcomes
//   9.x  matching.rs: order validation, order/order and order/pool fills
//   10.x liquidation.rs: the staged liquidation pipeline
//   10.1 account.rs: subaccount registry, system account roles
//   11.x events.rs: state transition events for audit
//   12.x product.rs: per-product runtime state

// value and balance primitives
pub mod fixed;
pub mod ledger;
pub mod lp;
pub mod perp;
pub mod types;

// risk and settlement engines
pub mod health;
pub mod liquidation;
pub mod matching;
pub mod risk;

// engine surface
pub mod account;
pub mod config;
pub mod engine;
pub mod events;
pub mod product;

// re exports for convenience
pub use account::{AccountRegistry, AccountRole, SubaccountInfo};
pub use config::{EngineConfig, FeeRates, LiquidationParams, ProductConfig, ProductKindTag};
pub use engine::{
    Clearinghouse, CoreState, EngineError, Intent, LiquidationOutcome, MatchResult,
    OrderRejectReason,
};
pub use events::{Event, EventLog, EventPayload};
pub use fixed::{Fixed18, MathError};
pub use health::account_health;
pub use ledger::{InterestCurve, SpotLedger, SpotState};
pub use lp::{LpBalance, LpBurn, LpLedger, LpMint, LpState};
pub use matching::Order;
pub use perp::{PerpBalance, PerpLedger, PerpState};
pub use product::{ProductEngine, ProductLedger};
pub use risk::RiskCurve;
pub use types::{
    Delta, HealthType, LiquidationTarget, OrderDigest, ProductId, SpreadPair, Subaccount,
    Timestamp,
};
