//! Strategy configuration.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::Interval;
use crate::schedule::ReferenceTimezone;

use super::IndicatorSet;

/// Which pattern opens a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPolicy {
    /// Close beyond the range plus an ATR buffer, confirmed by both
    /// averages and above-average volume.
    BreakoutConfirmed,
    /// Candle wicks outside the range and closes back inside it; trade
    /// toward the opposite side with the stop at the poked boundary.
    ReversalIntoRange,
}

/// How an open position's stop is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Stop and target stay where they were set at entry
    FixedStops,
    /// Stop ratchets behind price by one ATR
    TrailingStop,
}

/// What happens to an open position when the trading day changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayRolloverPolicy {
    /// Close at the latest known price and book the P&L
    SettleAtMarket,
    /// Drop the position without booking any P&L
    Discard,
}

macro_rules! policy_str {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().replace('-', "_").as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => anyhow::bail!("Unknown {}: {}", stringify!($ty), other),
                }
            }
        }
    };
}

policy_str!(EntryPolicy {
    BreakoutConfirmed => "breakout_confirmed",
    ReversalIntoRange => "reversal_into_range",
});

policy_str!(ExitPolicy {
    FixedStops => "fixed_stops",
    TrailingStop => "trailing_stop",
});

policy_str!(DayRolloverPolicy {
    SettleAtMarket => "settle_at_market",
    Discard => "discard",
});

/// Configuration for range detection, signals, exits and risk sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    // === Policies ===
    pub entry_policy: EntryPolicy,
    pub exit_policy: ExitPolicy,
    pub rollover_policy: DayRolloverPolicy,

    // === Candles ===
    /// Interval of the candle that defines the daily range
    pub reference_interval: Interval,

    /// Interval of the candles evaluated every cycle
    pub execution_interval: Interval,

    /// Timezone that defines the trading day
    pub reference_timezone: ReferenceTimezone,

    // === Indicators ===
    /// ATR lookback period
    pub atr_period: usize,

    /// Fast moving average period
    pub fast_period: usize,

    /// Slow moving average period
    pub slow_period: usize,

    /// Average volume period
    pub volume_period: usize,

    // === Entry / exit levels ===
    /// Breakout buffer as a multiple of ATR
    pub breakout_buffer_atr: Decimal,

    /// Stop distance as a multiple of ATR (breakout entries)
    pub stop_atr: Decimal,

    /// Target distance as a multiple of ATR (breakout entries)
    pub target_atr: Decimal,

    /// Target distance as a multiple of the stop distance (reversal entries)
    pub reward_ratio: Decimal,

    // === Risk ===
    /// Fraction of balance risked per trade (0.0 to 1.0)
    pub risk_fraction: Decimal,

    /// Absolute cap on the amount risked per trade
    pub max_risk_absolute: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            entry_policy: EntryPolicy::BreakoutConfirmed,
            exit_policy: ExitPolicy::TrailingStop,
            rollover_policy: DayRolloverPolicy::SettleAtMarket,

            reference_interval: Interval::Hour4,
            execution_interval: Interval::Min5,
            reference_timezone: ReferenceTimezone::default(), // UTC-4, no DST

            atr_period: 14,
            fast_period: 20,
            slow_period: 50,
            volume_period: 10,

            breakout_buffer_atr: dec!(0.5),
            stop_atr: dec!(1),
            target_atr: dec!(2),
            reward_ratio: dec!(2),

            risk_fraction: dec!(0.01),       // 1% of balance
            max_risk_absolute: dec!(250),    // never more than $250
        }
    }
}

impl StrategyConfig {
    /// Candles needed for every indicator to be available.
    pub fn required_candles(&self) -> usize {
        IndicatorSet::from_config(self).required_candles()
    }

    /// Whether entries need the indicator set.
    pub fn needs_indicators(&self) -> bool {
        self.entry_policy == EntryPolicy::BreakoutConfirmed
            || self.exit_policy == ExitPolicy::TrailingStop
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.atr_period == 0
            || self.fast_period == 0
            || self.slow_period == 0
            || self.volume_period == 0
        {
            anyhow::bail!("Indicator periods must be positive");
        }
        if self.risk_fraction <= Decimal::ZERO || self.risk_fraction > Decimal::ONE {
            anyhow::bail!("risk_fraction must be in (0, 1], got {}", self.risk_fraction);
        }
        if self.max_risk_absolute <= Decimal::ZERO {
            anyhow::bail!("max_risk_absolute must be positive");
        }
        if self.stop_atr <= Decimal::ZERO || self.target_atr <= Decimal::ZERO {
            anyhow::bail!("stop_atr and target_atr must be positive");
        }
        if self.reward_ratio <= Decimal::ZERO {
            anyhow::bail!("reward_ratio must be positive");
        }
        if self.breakout_buffer_atr < Decimal::ZERO {
            anyhow::bail!("breakout_buffer_atr cannot be negative");
        }
        Ok(())
    }
}
