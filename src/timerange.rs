//! Calendar-window arithmetic for reports
//!
//! Windows are built from local calendar dates in the configured zone and
//! whole-day steps on `NaiveDate`, never by subtracting a duration from an
//! instant, so a DST transition can't shift a day boundary. Only "last N hours"
//! windows subtract a duration, because they are defined in elapsed time.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::str::FromStr;

/// Longest accepted custom range, in days between start and end.
pub const MAX_CUSTOM_RANGE_DAYS: i64 = 730;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("range spans {days} days (maximum {MAX_CUSTOM_RANGE_DAYS})")]
    TooLong { days: i64 },

    #[error("unknown range key: {0}")]
    UnknownKey(String),

    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("local midnight of {0} does not exist in the configured zone")]
    UnrepresentableDate(NaiveDate),

    #[error("lookback of {0} hours is out of range")]
    LookbackTooLong(u32),
}

/// Symbolic report windows; all bounded ones end yesterday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RangeKey {
    Yesterday,
    Month,
    Quarter,
    HalfYear,
    Year,
    All,
}

impl RangeKey {
    /// Window length in days, None for "all".
    pub fn days(self) -> Option<u64> {
        match self {
            RangeKey::Yesterday => Some(1),
            RangeKey::Month => Some(30),
            RangeKey::Quarter => Some(90),
            RangeKey::HalfYear => Some(180),
            RangeKey::Year => Some(365),
            RangeKey::All => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RangeKey::Yesterday => "d-1",
            RangeKey::Month => "month",
            RangeKey::Quarter => "quarter",
            RangeKey::HalfYear => "half-year",
            RangeKey::Year => "year",
            RangeKey::All => "all",
        }
    }
}

impl FromStr for RangeKey {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d-1" | "yesterday" => Ok(RangeKey::Yesterday),
            "d-30" | "month" | "30d" => Ok(RangeKey::Month),
            "d-90" | "quarter" | "90d" => Ok(RangeKey::Quarter),
            "d-180" | "half-year" | "6m" | "180d" => Ok(RangeKey::HalfYear),
            "d-365" | "year" | "365d" => Ok(RangeKey::Year),
            "all" => Ok(RangeKey::All),
            other => Err(RangeError::UnknownKey(other.to_string())),
        }
    }
}

/// Closed calendar-date pair, or the unbounded "all" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateWindow {
    Bounded { start: NaiveDate, end: NaiveDate },
    Unbounded,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            DateWindow::Bounded { start, end } => date >= *start && date <= *end,
            DateWindow::Unbounded => true,
        }
    }
}

/// Local date of `now` in `zone`, minus one calendar day.
pub fn yesterday(now: DateTime<Utc>, zone: Tz) -> NaiveDate {
    let today = now.with_timezone(&zone).date_naive();
    today.pred_opt().unwrap_or(today)
}

/// Map a symbolic key onto a closed date window ending yesterday.
pub fn resolve_range_window(now: DateTime<Utc>, zone: Tz, key: RangeKey) -> DateWindow {
    let Some(days) = key.days() else {
        return DateWindow::Unbounded;
    };
    let end = yesterday(now, zone);
    let start = end.checked_sub_days(Days::new(days - 1)).unwrap_or(NaiveDate::MIN);
    DateWindow::Bounded { start, end }
}

/// Validate a caller-supplied date pair.
pub fn validate_custom_range(start: NaiveDate, end: NaiveDate) -> Result<DateWindow, RangeError> {
    if end < start {
        return Err(RangeError::EndBeforeStart { start, end });
    }
    let days = (end - start).num_days();
    if days > MAX_CUSTOM_RANGE_DAYS {
        return Err(RangeError::TooLong { days });
    }
    Ok(DateWindow::Bounded { start, end })
}

pub fn parse_date(s: &str) -> Result<NaiveDate, RangeError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| RangeError::InvalidDate(s.to_string()))
}

/// Concrete instant window, in both the local zone and UTC.
///
/// Half-open: `start <= t < end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start_local: DateTime<Tz>,
    pub end_local: DateTime<Tz>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl TimeRange {
    pub fn from_utc(start: DateTime<Utc>, end: DateTime<Utc>, zone: Tz) -> Self {
        Self {
            start_local: start.with_timezone(&zone),
            end_local: end.with_timezone(&zone),
            start_utc: start,
            end_utc: end,
        }
    }

    pub fn start_unix(&self) -> i64 {
        self.start_utc.timestamp()
    }

    pub fn end_unix(&self) -> i64 {
        self.end_utc.timestamp()
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start_utc && t < self.end_utc
    }

    pub fn contains_unix_ns(&self, ns: i64) -> bool {
        self.contains(DateTime::from_timestamp_nanos(ns))
    }
}

/// First instant of `date` in `zone`.
///
/// Ambiguous midnights take the earlier instant; a midnight skipped by a DST
/// gap resolves to the first valid hour of that day.
pub fn local_midnight(date: NaiveDate, zone: Tz) -> Result<DateTime<Tz>, RangeError> {
    (0..=3)
        .filter_map(|hour| {
            let naive = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0)?);
            zone.from_local_datetime(&naive).earliest()
        })
        .next()
        .ok_or(RangeError::UnrepresentableDate(date))
}

/// Exact local day window for `date` (23, 24 or 25 hours long).
pub fn day_range(date: NaiveDate, zone: Tz) -> Result<TimeRange, RangeError> {
    let next = date.succ_opt().ok_or(RangeError::UnrepresentableDate(date))?;
    let start = local_midnight(date, zone)?.with_timezone(&Utc);
    let end = local_midnight(next, zone)?.with_timezone(&Utc);
    Ok(TimeRange::from_utc(start, end, zone))
}

/// Window covering every local day from `start` through `end` inclusive.
pub fn dates_range(start: NaiveDate, end: NaiveDate, zone: Tz) -> Result<TimeRange, RangeError> {
    let first = day_range(start, zone)?;
    let last = day_range(end, zone)?;
    Ok(TimeRange::from_utc(first.start_utc, last.end_utc, zone))
}

/// From local midnight today until `now`.
pub fn today_so_far(now: DateTime<Utc>, zone: Tz) -> Result<TimeRange, RangeError> {
    let today = now.with_timezone(&zone).date_naive();
    let start = local_midnight(today, zone)?.with_timezone(&Utc);
    Ok(TimeRange::from_utc(start, now, zone))
}

/// The trailing `hours` ending at `now`.
pub fn lookback_range(now: DateTime<Utc>, zone: Tz, hours: u32) -> Result<TimeRange, RangeError> {
    let start = now
        .checked_sub_signed(Duration::hours(i64::from(hours)))
        .ok_or(RangeError::LookbackTooLong(hours))?;
    Ok(TimeRange::from_utc(start, now, zone))
}
