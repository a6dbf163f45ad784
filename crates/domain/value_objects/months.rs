use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MONTH_FORMAT: &str = "MM-YYYY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month {input:?}, expected {MONTH_FORMAT}")]
pub struct MonthParseError {
    pub input: String,
}

/// A calendar month. Always backed by the first day of the month, so two values
/// compare equal exactly when they name the same month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BillingMonth(NaiveDate);

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(0..=9999).contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn parse(raw: &str) -> Result<Self, MonthParseError> {
        let invalid = || MonthParseError {
            input: raw.to_string(),
        };

        let (month, year) = raw.split_once('-').ok_or_else(invalid)?;
        if month.len() != 2 || year.len() != 4 {
            return Err(invalid());
        }
        if !month.bytes().chain(year.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let month: u32 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;

        Self::new(year, month).ok_or_else(invalid)
    }

    /// Truncates a timestamp to the month it falls in (UTC).
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        let date = value.date_naive();
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// First instant of the month in UTC. This is the value persisted in storage.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc()
    }

    /// Months since year 0, so that `b.ordinal() - a.ordinal()` is the distance in months.
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year()) * 12 + i64::from(self.month0())
    }

    fn month0(&self) -> u32 {
        self.0.month0()
    }
}

impl Display for BillingMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:04}", self.month(), self.year())
    }
}

impl FromStr for BillingMonth {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<BillingMonth> for DateTime<Utc> {
    fn from(value: BillingMonth) -> Self {
        value.starts_at()
    }
}

impl Serialize for BillingMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BillingMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Number of whole months shared by a subscription's active interval and a query window.
///
/// Open ends are unbounded. When both the subscription and the window are open-ended
/// the overlap stops at `as_of`, so an ongoing subscription accrues cost up to that month.
pub fn overlap_months(
    active_from: BillingMonth,
    active_until: Option<BillingMonth>,
    window_start: Option<BillingMonth>,
    window_end: Option<BillingMonth>,
    as_of: BillingMonth,
) -> u64 {
    let first = match window_start {
        Some(window_start) => active_from.max(window_start),
        None => active_from,
    };

    let last = match (active_until, window_end) {
        (Some(until), Some(end)) => until.min(end),
        (Some(until), None) => until,
        (None, Some(end)) => end,
        (None, None) => as_of,
    };

    let months = last.ordinal() - first.ordinal() + 1;
    u64::try_from(months).unwrap_or(0)
}
