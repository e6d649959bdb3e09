//! Wire types for the Binance REST API.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::models::Candle;

/// One row of `/api/v3/klines`.
///
/// The exchange sends each kline as a positional array:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
/// trades, taker_base_volume, taker_quote_volume, ignore]`.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineRow(
    pub i64,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub i64,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
);

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("Invalid kline timestamp: {}", ms))
}

impl KlineRow {
    pub fn into_candle(self) -> Result<Candle> {
        Ok(Candle {
            open: self.1,
            high: self.2,
            low: self.3,
            close: self.4,
            volume: self.5,
            open_time: from_millis(self.0)?,
            close_time: from_millis(self.6)?,
        })
    }
}
