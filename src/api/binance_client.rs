//! Binance spot REST client for public kline data.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::models::{Candle, Interval};

use super::types::KlineRow;
use super::CandleSource;

pub const BINANCE_API_BASE: &str = "https://api.binance.us";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LIMIT: usize = 1000;

/// Read-only client for `/api/v3/klines`.
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE.to_string())
    }

    /// Create with custom base URL (other Binance deployments, testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch raw klines, including the one still forming.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval.as_str(),
            limit.clamp(1, MAX_LIMIT)
        );

        debug!(url = %url, "Fetching klines");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch klines")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Klines request failed: {} - {}", status, body);
        }

        let rows: Vec<KlineRow> = response
            .json()
            .await
            .context("Failed to parse klines response")?;

        rows.into_iter().map(KlineRow::into_candle).collect()
    }
}

/// Keep the last `count` candles that have closed by `now`.
pub(crate) fn closed_tail(
    mut candles: Vec<Candle>,
    now: chrono::DateTime<Utc>,
    count: usize,
) -> Vec<Candle> {
    candles.retain(|c| c.is_closed_at(now));
    candles.sort_by_key(|c| c.close_time);
    let skip = candles.len().saturating_sub(count);
    candles.split_off(skip)
}

impl CandleSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>> {
        // One extra: the newest kline is usually still open.
        let candles = self.get_klines(symbol, interval, count + 1).await?;
        let closed = closed_tail(candles, Utc::now(), count);
        debug!(
            symbol,
            interval = %interval,
            requested = count,
            returned = closed.len(),
            "Closed candles"
        );
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rust_decimal_macros::dec;

    fn candle(minute: i64) -> Candle {
        let open_time = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
            + ChronoDuration::minutes(5 * minute);
        Candle {
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
            open_time,
            close_time: open_time + ChronoDuration::minutes(5) - ChronoDuration::milliseconds(1),
        }
    }

    #[test]
    fn test_closed_tail_drops_forming_candle() {
        let candles = vec![candle(0), candle(1), candle(2), candle(3)];
        // 12:17: candle 3 (12:15-12:20) still open
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 17, 0).unwrap();

        let closed = closed_tail(candles.clone(), now, 10);
        assert_eq!(closed.len(), 3);
        assert_eq!(closed.last(), Some(&candles[2]));

        let last_two = closed_tail(candles.clone(), now, 2);
        assert_eq!(last_two, vec![candles[1].clone(), candles[2].clone()]);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = BinanceClient::with_base_url("http://localhost:9000/".to_string()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000");
    }
}
