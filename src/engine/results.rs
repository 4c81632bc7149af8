// 8.0.2: result types and errors for engine operations.
//
// error taxonomy: validation errors reject before any mutation; solvency
// errors discard the whole intent; arithmetic errors are fatal for the
// intent; liveness errors carry a specific reason so the sequencer can retry
// at a later pipeline stage. no error is ever partially applied.

use crate::fixed::{Fixed18, MathError};
use crate::types::{LiquidationTarget, ProductId, Subaccount};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("arithmetic: {0}")]
    Math(#[from] MathError),

    // validation
    #[error("invalid order: {reason}")]
    InvalidOrder { reason: OrderRejectReason },

    #[error("invalid amount {amount}")]
    InvalidAmount { amount: Fixed18 },

    #[error("invalid price {price}")]
    InvalidPrice { price: Fixed18 },

    #[error("interest interval {dt_secs}s out of bounds")]
    InvalidInterval { dt_secs: u64 },

    #[error("{0} not listed")]
    ProductNotFound(ProductId),

    #[error("wrong ledger kind for {product}")]
    ProductKindMismatch { product: ProductId },

    // solvency
    #[error("taker unhealthy after fill (health {health})")]
    UnhealthyTaker { health: Fixed18 },

    #[error("maker unhealthy after fill (health {health})")]
    UnhealthyMaker { health: Fixed18 },

    #[error("lp mint outside quote bounds (required {required})")]
    SlippageExceeded { required: Fixed18 },

    #[error("burn of {requested} exceeds {held} shares held")]
    InsufficientShares { requested: Fixed18, held: Fixed18 },

    #[error("subaccount {account} unhealthy (health {health})")]
    SubaccountHealth { account: Subaccount, health: Fixed18 },

    // liveness: liquidation pipeline gates
    #[error("account not liquidatable (maintenance health {health})")]
    NotLiquidatable { health: Fixed18 },

    #[error("closeable assets remain; liabilities not yet liquidatable")]
    NotLiquidatableLiabilities,

    #[error("liquidation amount {amount} not acceptable")]
    NotLiquidatableAmount { amount: Fixed18 },

    #[error("over-liquidated (initial health {health})")]
    LiquidatedTooMuch { health: Fixed18 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRejectReason {
    Expired,
    ZeroSize,
    NonPositivePrice,
    ReduceOnlyIncreases,
    SameSide,
    NotCrossing,
    OverFilled,
    SelfTrade,
}

impl std::fmt::Display for OrderRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderRejectReason::Expired => "expired",
            OrderRejectReason::ZeroSize => "zero remaining size",
            OrderRejectReason::NonPositivePrice => "non-positive price",
            OrderRejectReason::ReduceOnlyIncreases => "reduce-only order increases position",
            OrderRejectReason::SameSide => "orders on the same side",
            OrderRejectReason::NotCrossing => "limit prices do not cross",
            OrderRejectReason::OverFilled => "fill would exceed original size",
            OrderRejectReason::SelfTrade => "taker and maker are the same subaccount",
        };
        f.write_str(s)
    }
}

/// One settled fill between two parties (or a party and the pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub product: ProductId,
    // taker's signed base fill; the counterparty takes the negation
    pub filled_base: Fixed18,
    // taker's signed quote leg, fees excluded
    pub filled_quote: Fixed18,
    pub price: Fixed18,
    pub taker_fee: Fixed18,
    pub maker_fee: Fixed18,
}

impl MatchResult {
    pub fn no_fill(product: ProductId, price: Fixed18) -> Self {
        Self {
            product,
            filled_base: Fixed18::ZERO,
            filled_quote: Fixed18::ZERO,
            price,
            taker_fee: Fixed18::ZERO,
            maker_fee: Fixed18::ZERO,
        }
    }

    pub fn is_fill(&self) -> bool {
        !self.filled_base.is_zero()
    }
}

/// Which terminal stage a liquidation intent reached.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LiquidationOutcome {
    /// No liquidatable exposure remained: residual shortfalls were paid from
    /// insurance and any remainder socialized. No liquidator payment.
    Finalized {
        insurance_paid: Fixed18,
        socialized: Fixed18,
    },
    /// LP shares were force-burned and that alone restored initial health.
    LpDecomposed {
        shares_burned: Fixed18,
        fee_to_insurance: Fixed18,
    },
    /// A position transfer was executed at the penalized price.
    Paid {
        target: LiquidationTarget,
        amount: Fixed18,
        price: Fixed18,
        insurance_fee: Fixed18,
    },
}
