//! Market data sources for closed candles.

mod binance_client;
mod types;

#[cfg(test)]
pub mod testing;

use anyhow::Result;

use crate::models::{Candle, Interval};

pub use binance_client::{BinanceClient, BINANCE_API_BASE};
pub use types::KlineRow;

/// Source of closed candles, oldest first.
///
/// Implementations return at most `count` of the most recent candles that
/// have already closed. Fewer may be returned when history is short.
#[allow(async_fn_in_trait)]
pub trait CandleSource {
    async fn fetch_candles(&self, symbol: &str, interval: Interval, count: usize)
        -> Result<Vec<Candle>>;
}
