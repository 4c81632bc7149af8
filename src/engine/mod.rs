// 8.x engine/: core state, the intent surface and result types.

pub mod core;
pub mod intents;
pub mod results;

pub use core::CoreState;
pub use intents::{Clearinghouse, Intent};
pub use results::{EngineError, LiquidationOutcome, MatchResult, OrderRejectReason};
