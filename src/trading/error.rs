//! Recoverable errors raised by the decision engine.

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Errors from range, indicator, sizing and signal evaluation.
///
/// None of these stop the bot: the current cycle answers `NoAction`
/// and the next cycle starts from unchanged state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("Insufficient data for {indicator}: need {required} candles, have {available}")]
    InsufficientData {
        indicator: &'static str,
        required: usize,
        available: usize,
    },

    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid stop distance: {0}")]
    InvalidStopDistance(Decimal),

    #[error("Risk amount {0} is not positive")]
    InsufficientBalance(Decimal),

    #[error("Both long and short triggers fired at close {close}")]
    InconsistentSignal { close: Decimal },

    #[error("Trading day went backwards: last {last}, observed {observed}")]
    ClockAnomaly { last: NaiveDate, observed: NaiveDate },

    #[error("Invalid range: high {high} < low {low}")]
    InvalidRange { high: Decimal, low: Decimal },
}

impl StrategyError {
    /// Whether the error only means "not enough data yet".
    pub fn is_data_shortage(&self) -> bool {
        matches!(
            self,
            StrategyError::InsufficientData { .. } | StrategyError::DataUnavailable(_)
        )
    }
}
