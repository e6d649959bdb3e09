//! Trading logic: daily range, indicators, risk sizing and the position state machine.

mod config;
mod error;
mod indicators;
mod position_sizer;
mod range;
mod strategy;

pub use config::{DayRolloverPolicy, EntryPolicy, ExitPolicy, StrategyConfig};
pub use error::StrategyError;
pub use indicators::{atr, avg_volume, sma_close, IndicatorSet, Indicators};
pub use position_sizer::RiskSizer;
pub use range::{select_first_of_day, DailyRange, DayChange, RangeStatus, RangeTracker};
pub use strategy::{
    breakout_signal, ratchet, reversal_signal, Cycle, CycleInput, EntrySignal,
    PositionStateMachine,
};
