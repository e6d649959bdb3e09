//! Candle model and candle intervals.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A closed OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,

    /// When the candle opened
    pub open_time: DateTime<Utc>,

    /// When the candle closed (exchange convention: last millisecond of the interval)
    pub close_time: DateTime<Utc>,
}

impl Candle {
    /// High-low spread of this candle.
    pub fn spread(&self) -> Decimal {
        self.high - self.low
    }

    /// True range against the previous candle's close.
    pub fn true_range(&self, prev_close: Decimal) -> Decimal {
        self.spread()
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }

    /// Whether the candle has closed as of `now`.
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        self.close_time < now
    }
}

/// Candle interval supported by the market data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Interval {
    /// Exchange interval code (e.g. "4h").
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour4 => "4h",
            Interval::Day1 => "1d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::Min1 => Duration::minutes(1),
            Interval::Min5 => Duration::minutes(5),
            Interval::Min15 => Duration::minutes(15),
            Interval::Min30 => Duration::minutes(30),
            Interval::Hour1 => Duration::hours(1),
            Interval::Hour4 => Duration::hours(4),
            Interval::Day1 => Duration::days(1),
        }
    }

    /// Number of candles of this interval in one day.
    pub fn per_day(&self) -> usize {
        (Duration::days(1).num_seconds() / self.duration().num_seconds()).max(1) as usize
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Interval::Min1),
            "5m" => Ok(Interval::Min5),
            "15m" => Ok(Interval::Min15),
            "30m" => Ok(Interval::Min30),
            "1h" => Ok(Interval::Hour1),
            "4h" => Ok(Interval::Hour4),
            "1d" => Ok(Interval::Day1),
            other => anyhow::bail!("Unknown candle interval: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal, low: Decimal) -> Candle {
        let open_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Candle {
            open: low,
            high,
            low,
            close: high,
            volume: dec!(1),
            open_time,
            close_time: open_time + Duration::minutes(5) - Duration::milliseconds(1),
        }
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let c = candle(dec!(105), dec!(100));

        // Inside the bar: plain spread
        assert_eq!(c.true_range(dec!(102)), dec!(5));
        // Gap up: previous close below the low
        assert_eq!(c.true_range(dec!(95)), dec!(10));
        // Gap down: previous close above the high
        assert_eq!(c.true_range(dec!(112)), dec!(12));
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("4h".parse::<Interval>().unwrap(), Interval::Hour4);
        assert_eq!("5M".parse::<Interval>().unwrap(), Interval::Min5);
        assert!("7h".parse::<Interval>().is_err());
        assert_eq!(Interval::Hour4.per_day(), 6);
    }

    #[test]
    fn test_closed_at() {
        let c = candle(dec!(2), dec!(1));
        assert!(!c.is_closed_at(c.close_time));
        assert!(c.is_closed_at(c.close_time + Duration::milliseconds(1)));
    }
}
