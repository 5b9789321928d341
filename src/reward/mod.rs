//! Reward and ranking primitives
//!
//! Decimal-exact payout splitting and time-decayed scoring. Pure functions;
//! the content handlers feed them chain state and persist the results.

pub mod decimal;
pub mod payout;
pub mod score;

pub use decimal::{apply_percent, decimal_from_json, normalized, Asset, PERCENT_BASE};
pub use payout::{compute as compute_payout, PayoutInput, PayoutSplit};
pub use score::{rank, score, ScoreParams, HOT, TRENDING};
