//! Daily reference range taken from the first closed reference candle of the
//! trading day.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::CandleSource;
use crate::models::{Candle, Interval};
use crate::schedule::ReferenceTimezone;

use super::StrategyError;

/// High/low band that breakouts are measured against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRange {
    pub high: Decimal,
    pub low: Decimal,
    pub trading_day: NaiveDate,
}

impl DailyRange {
    pub fn new(high: Decimal, low: Decimal, trading_day: NaiveDate) -> Result<Self, StrategyError> {
        if high < low {
            return Err(StrategyError::InvalidRange { high, low });
        }
        Ok(Self {
            high,
            low,
            trading_day,
        })
    }

    pub fn from_candle(candle: &Candle, trading_day: NaiveDate) -> Result<Self, StrategyError> {
        Self::new(candle.high, candle.low, trading_day)
    }

    pub fn width(&self) -> Decimal {
        self.high - self.low
    }

    /// Whether `price` lies within the band, inclusive.
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Result of asking for today's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeStatus {
    Ready(DailyRange),
    /// The first reference candle of the day has not closed yet
    Pending,
}

/// How the observed trading day relates to the previous observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayChange {
    First,
    Unchanged,
    NewDay { previous: NaiveDate },
}

/// Pick the earliest candle whose close time falls on `day` in `tz`.
pub fn select_first_of_day<'a>(
    candles: &'a [Candle],
    day: NaiveDate,
    tz: &ReferenceTimezone,
) -> Option<&'a Candle> {
    candles
        .iter()
        .filter(|c| tz.trading_day(c.close_time) == day)
        .min_by_key(|c| c.close_time)
}

/// Caches the current day's range and clears it when the day advances.
#[derive(Debug, Clone)]
pub struct RangeTracker {
    interval: Interval,
    timezone: ReferenceTimezone,
    current_day: Option<NaiveDate>,
    range: Option<DailyRange>,
}

impl RangeTracker {
    pub fn new(interval: Interval, timezone: ReferenceTimezone) -> Self {
        Self {
            interval,
            timezone,
            current_day: None,
            range: None,
        }
    }

    pub fn current_day(&self) -> Option<NaiveDate> {
        self.current_day
    }

    /// Cached range, if one has been established for the current day.
    pub fn range(&self) -> Option<&DailyRange> {
        self.range.as_ref()
    }

    /// Record the trading day observed this cycle.
    ///
    /// A day earlier than the last observed one is reported as
    /// `ClockAnomaly` and leaves the tracker untouched.
    pub fn roll_day(&mut self, today: NaiveDate) -> Result<DayChange, StrategyError> {
        match self.current_day {
            None => {
                self.current_day = Some(today);
                Ok(DayChange::First)
            }
            Some(last) if today == last => Ok(DayChange::Unchanged),
            Some(last) if today < last => Err(StrategyError::ClockAnomaly {
                last,
                observed: today,
            }),
            Some(previous) => {
                info!(previous = %previous, today = %today, "New trading day, clearing range");
                self.current_day = Some(today);
                self.range = None;
                Ok(DayChange::NewDay { previous })
            }
        }
    }

    /// Return the range of the current trading day, fetching the first
    /// closed reference candle of the day if it is not cached yet.
    ///
    /// Stays `Pending` until `roll_day` has set a day.
    pub async fn ensure_range<S: CandleSource>(
        &mut self,
        source: &S,
        symbol: &str,
    ) -> Result<RangeStatus, StrategyError> {
        let Some(today) = self.current_day else {
            return Ok(RangeStatus::Pending);
        };

        if let Some(range) = &self.range {
            return Ok(RangeStatus::Ready(range.clone()));
        }

        // Two days of reference candles always cover today's first close.
        let count = self.interval.per_day() * 2;
        let candles = source
            .fetch_candles(symbol, self.interval, count)
            .await
            .map_err(|e| StrategyError::DataUnavailable(format!("{:#}", e)))?;

        let Some(first) = select_first_of_day(&candles, today, &self.timezone) else {
            debug!(day = %today, interval = %self.interval, "First reference candle not closed yet");
            return Ok(RangeStatus::Pending);
        };

        let range = DailyRange::from_candle(first, today)?;
        info!(
            day = %today,
            high = %range.high,
            low = %range.low,
            closed_at = %first.close_time,
            "Daily range set"
        );
        self.range = Some(range.clone());
        Ok(RangeStatus::Ready(range))
    }

}
