//! ATR, simple moving averages and average volume over a candle window.
//!
//! Everything here is a pure function of the window (most recent candle
//! last). Nothing is carried between cycles.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Candle;

use super::{StrategyConfig, StrategyError};

/// Indicator snapshot for one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    pub atr: Decimal,
    pub fast_avg: Decimal,
    pub slow_avg: Decimal,
    pub avg_volume: Decimal,
}

fn tail<'a>(
    candles: &'a [Candle],
    n: usize,
    indicator: &'static str,
) -> Result<&'a [Candle], StrategyError> {
    if n == 0 || candles.len() < n {
        return Err(StrategyError::InsufficientData {
            indicator,
            required: n.max(1),
            available: candles.len(),
        });
    }
    Ok(&candles[candles.len() - n..])
}

fn mean(values: impl Iterator<Item = Decimal>, n: usize) -> Decimal {
    values.sum::<Decimal>() / Decimal::from(n)
}

/// Average true range over the last `period` candles.
///
/// Each true range needs the previous close, so `period + 1` candles are
/// required.
pub fn atr(candles: &[Candle], period: usize) -> Result<Decimal, StrategyError> {
    if period == 0 {
        return Err(StrategyError::InsufficientData {
            indicator: "atr",
            required: 1,
            available: candles.len(),
        });
    }
    let window = tail(candles, period + 1, "atr")?;
    let ranges = window
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close));
    Ok(mean(ranges, period))
}

/// Arithmetic mean of the last `period` closes.
pub fn sma_close(candles: &[Candle], period: usize) -> Result<Decimal, StrategyError> {
    let window = tail(candles, period, "sma")?;
    Ok(mean(window.iter().map(|c| c.close), period))
}

/// Arithmetic mean of the last `period` volumes.
pub fn avg_volume(candles: &[Candle], period: usize) -> Result<Decimal, StrategyError> {
    let window = tail(candles, period, "avg_volume")?;
    Ok(mean(window.iter().map(|c| c.volume), period))
}

/// Indicator calculator configured with lookback periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorSet {
    pub atr_period: usize,
    pub fast_period: usize,
    pub slow_period: usize,
    pub volume_period: usize,
}

impl IndicatorSet {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            atr_period: config.atr_period,
            fast_period: config.fast_period,
            slow_period: config.slow_period,
            volume_period: config.volume_period,
        }
    }

    /// Candles needed for `compute` to succeed.
    pub fn required_candles(&self) -> usize {
        (self.atr_period + 1)
            .max(self.fast_period)
            .max(self.slow_period)
            .max(self.volume_period)
    }

    pub fn compute(&self, candles: &[Candle]) -> Result<Indicators, StrategyError> {
        let atr = atr(candles, self.atr_period)?;
        if atr <= Decimal::ZERO {
            return Err(StrategyError::DataUnavailable(
                "ATR is zero over the lookback window".to_string(),
            ));
        }
        Ok(Indicators {
            atr,
            fast_avg: sma_close(candles, self.fast_period)?,
            slow_avg: sma_close(candles, self.slow_period)?,
            avg_volume: avg_volume(candles, self.volume_period)?,
        })
    }
}
