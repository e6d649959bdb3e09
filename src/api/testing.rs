//! In-memory candle source for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use crate::models::{Candle, Interval};

use super::CandleSource;

/// Returns whatever candles were last pushed for an interval.
#[derive(Default)]
pub struct ScriptedSource {
    candles: Mutex<HashMap<Interval, Vec<Candle>>>,
    failure: Mutex<Option<String>>,
    calls: Mutex<usize>,
}

impl ScriptedSource {
    /// Replace the candles served for `interval`.
    pub fn push(&self, interval: Interval, candles: Vec<Candle>) {
        self.candles.lock().unwrap().insert(interval, candles);
    }

    /// Fail the next fetch with `message`.
    pub fn fail_next(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Number of fetches so far, including failed ones.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CandleSource for ScriptedSource {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>> {
        *self.calls.lock().unwrap() += 1;
        if let Some(message) = self.failure.lock().unwrap().take() {
            anyhow::bail!("{}", message);
        }
        let candles = self
            .candles
            .lock()
            .unwrap()
            .get(&interval)
            .cloned()
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(count);
        Ok(candles[skip..].to_vec())
    }
}
