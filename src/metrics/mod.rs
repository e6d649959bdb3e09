//! Performance statistics over closed trades.

mod calculator;

pub use calculator::TradeStats;
