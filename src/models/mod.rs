//! Data models for candles, positions, the paper account and decisions.

mod account;
mod candle;
mod decision;
mod position;

pub use account::AccountState;
pub use candle::{Candle, Interval};
pub use decision::{Decision, DiscardReason, ExitReason};
pub use position::{OpenPosition, PositionState, Side};
