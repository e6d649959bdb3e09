//! Scheduling policies: reference timezone, trading window gate, clock and
//! retry backoff around the per-cycle call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

use crate::models::Interval;

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timezone in which trading days start and end.
///
/// `Fixed` ignores daylight saving, so a fixed UTC-4 drifts an hour from
/// New York wall time during winter. `NewYork` follows the DST calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceTimezone {
    Fixed { offset_hours: i32 },
    NewYork,
}

impl Default for ReferenceTimezone {
    fn default() -> Self {
        ReferenceTimezone::Fixed { offset_hours: -4 }
    }
}

impl ReferenceTimezone {
    fn fixed_offset(offset_hours: i32) -> FixedOffset {
        FixedOffset::east_opt(offset_hours.clamp(-23, 23) * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Wall-clock time in this timezone.
    pub fn local(&self, t: DateTime<Utc>) -> NaiveDateTime {
        match self {
            ReferenceTimezone::Fixed { offset_hours } => {
                t.with_timezone(&Self::fixed_offset(*offset_hours)).naive_local()
            }
            ReferenceTimezone::NewYork => t.with_timezone(&New_York).naive_local(),
        }
    }

    /// Trading day that `t` falls on.
    pub fn trading_day(&self, t: DateTime<Utc>) -> NaiveDate {
        self.local(t).date()
    }

    /// Convert a local wall-clock time to UTC, taking the earlier instant on
    /// ambiguous times and shifting forward across DST gaps.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            ReferenceTimezone::Fixed { offset_hours } => Self::fixed_offset(*offset_hours)
                .from_local_datetime(&local)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            ReferenceTimezone::NewYork => New_York
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| {
                    New_York
                        .from_local_datetime(&(local + Duration::hours(1)))
                        .earliest()
                })
                .map(|t| t.with_timezone(&Utc)),
        }
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }

    /// First instant of the given trading day.
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        self.to_utc(day.and_time(NaiveTime::MIN))
    }
}

impl fmt::Display for ReferenceTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceTimezone::Fixed { offset_hours } => write!(f, "UTC{:+}", offset_hours),
            ReferenceTimezone::NewYork => f.write_str("America/New_York"),
        }
    }
}

impl FromStr for ReferenceTimezone {
    type Err = anyhow::Error;

    /// Accepts `new_york`, `america/new_york`, `utc-4`, `fixed:-4` or `-4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "new_york" || lower == "america/new_york" || lower == "ny" {
            return Ok(ReferenceTimezone::NewYork);
        }

        let offset = lower
            .strip_prefix("fixed:")
            .or_else(|| lower.strip_prefix("utc"))
            .unwrap_or(&lower);
        let offset_hours: i32 = if offset.is_empty() {
            0
        } else {
            offset
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid reference timezone: {}", s))?
        };
        if !(-23..=23).contains(&offset_hours) {
            anyhow::bail!("UTC offset out of range: {}", offset_hours);
        }
        Ok(ReferenceTimezone::Fixed { offset_hours })
    }
}

/// Time-of-day window, in the reference timezone, during which cycles run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingWindow {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

impl Default for TradingWindow {
    fn default() -> Self {
        Self::before_first_close(Interval::Hour4, Duration::minutes(5))
    }
}

impl TradingWindow {
    /// Window that opens `lead` before the first reference candle of the
    /// day closes and stays open until the end of the day.
    pub fn before_first_close(reference: Interval, lead: Duration) -> Self {
        let first_close = reference.duration().min(Duration::days(1) - Duration::seconds(1));
        let opens = (first_close - lead).max(Duration::zero());
        Self {
            opens_at: NaiveTime::MIN + opens,
            closes_at: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        }
    }

    /// Window covering the whole day.
    pub fn always() -> Self {
        Self {
            opens_at: NaiveTime::MIN,
            closes_at: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        }
    }

    fn contains(&self, t: NaiveTime) -> bool {
        if self.opens_at <= self.closes_at {
            t >= self.opens_at && t <= self.closes_at
        } else {
            t >= self.opens_at || t <= self.closes_at
        }
    }

    /// Whether evaluation is permitted at `now`.
    pub fn is_open(&self, tz: &ReferenceTimezone, now: DateTime<Utc>) -> bool {
        self.contains(tz.local(now).time())
    }

    /// How long to wait until the window next opens; `None` when open.
    pub fn until_open(&self, tz: &ReferenceTimezone, now: DateTime<Utc>) -> Option<StdDuration> {
        if self.is_open(tz, now) {
            return None;
        }

        let local = tz.local(now);
        let day = if local.time() < self.opens_at {
            local.date()
        } else {
            local.date().succ_opt()?
        };
        let next_open = tz.to_utc(day.and_time(self.opens_at));
        (next_open - now).to_std().ok()
    }
}

/// Exponential backoff applied by the run loop after a failed cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// First retry delay in seconds
    pub base_delay_secs: u64,

    /// Growth factor between retries
    pub multiplier: f64,

    /// Upper bound on a single delay in seconds
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 5,
            multiplier: 2.0,
            max_delay_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// Build a deterministic (no jitter), never-expiring backoff.
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(StdDuration::from_secs(self.base_delay_secs.max(1)))
            .with_multiplier(self.multiplier.max(1.0))
            .with_max_interval(StdDuration::from_secs(
                self.max_delay_secs.max(self.base_delay_secs.max(1)),
            ))
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_fixed_offset_trading_day() {
        let tz = ReferenceTimezone::default();
        // 03:30 UTC is 23:30 the previous evening at UTC-4
        assert_eq!(
            tz.trading_day(utc(2024, 1, 10, 3, 30)),
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
        );
        assert_eq!(
            tz.trading_day(utc(2024, 1, 10, 4, 0)),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );
    }

    #[test]
    fn test_new_york_follows_dst() {
        let tz = ReferenceTimezone::NewYork;
        // January: New York is UTC-5, so 04:30 UTC is still the previous day
        assert_eq!(
            tz.trading_day(utc(2024, 1, 10, 4, 30)),
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
        );
        // July: UTC-4
        assert_eq!(
            tz.trading_day(utc(2024, 7, 10, 4, 30)),
            NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()
        );
        assert_eq!(
            tz.start_of_day(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            utc(2024, 1, 10, 5, 0)
        );
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!(
            "fixed:-4".parse::<ReferenceTimezone>().unwrap(),
            ReferenceTimezone::Fixed { offset_hours: -4 }
        );
        assert_eq!(
            "UTC-5".parse::<ReferenceTimezone>().unwrap(),
            ReferenceTimezone::Fixed { offset_hours: -5 }
        );
        assert_eq!(
            "America/New_York".parse::<ReferenceTimezone>().unwrap(),
            ReferenceTimezone::NewYork
        );
        assert!("fixed:30".parse::<ReferenceTimezone>().is_err());
        assert!("mars".parse::<ReferenceTimezone>().is_err());
    }

    #[test]
    fn test_default_window_opens_before_first_close() {
        let window = TradingWindow::default();
        assert_eq!(window.opens_at, NaiveTime::from_hms_opt(3, 55, 0).unwrap());

        let tz = ReferenceTimezone::default();
        // 03:00 local (07:00 UTC) is before the window
        let early = utc(2024, 1, 10, 7, 0);
        assert!(!window.is_open(&tz, early));
        assert_eq!(
            window.until_open(&tz, early),
            Some(StdDuration::from_secs(55 * 60))
        );

        // 10:00 local
        let midday = utc(2024, 1, 10, 14, 0);
        assert!(window.is_open(&tz, midday));
        assert_eq!(window.until_open(&tz, midday), None);
    }

    #[test]
    fn test_overnight_window_wraps() {
        let window = TradingWindow {
            opens_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            closes_at: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        };
        let tz = ReferenceTimezone::Fixed { offset_hours: 0 };
        assert!(window.is_open(&tz, utc(2024, 1, 10, 23, 0)));
        assert!(window.is_open(&tz, utc(2024, 1, 10, 1, 0)));
        assert!(!window.is_open(&tz, utc(2024, 1, 10, 12, 0)));
        assert_eq!(
            window.until_open(&tz, utc(2024, 1, 10, 12, 0)),
            Some(StdDuration::from_secs(10 * 3600))
        );
    }

    #[test]
    fn test_retry_policy_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay_secs: 5,
            multiplier: 2.0,
            max_delay_secs: 30,
        };
        let mut backoff = policy.to_backoff();

        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.next_backoff().map(|d| d.as_secs()).unwrap_or(0))
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_backoff().map(|d| d.as_secs()), Some(5));
    }
}
