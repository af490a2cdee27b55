// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Millisecond-precision UTC timestamps.
//!
//! A [`Timestamp`] is an `i64` of milliseconds since the UNIX epoch, constrained to the years
//! `0` through `9999`. It is used both as a record [`Value`](crate::Value) and to stamp
//! [`LogEntry`](crate::transaction::LogEntry) values at the moment an event fires.
use chrono::{DateTime, Datelike, Utc};
use std::{fmt, str::FromStr};

/// Error returned when creating or parsing a `Timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The year is outside the supported range of `0` to `9999`.
    InvalidYear(i32),
    /// The string could not be parsed as a valid RFC 3339 datetime.
    Parse(String),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::InvalidYear(year) => write!(
                f,
                "invalid year {year}, supported years are between 0 and 9999 included"
            ),
            TimestampError::Parse(s) => {
                write!(f, "failed to parse date {s} in rfc3339 format")
            }
        }
    }
}

impl std::error::Error for TimestampError {}

/// A UTC datetime with millisecond precision.
///
/// The valid range is `0000-01-01T00:00:00.000Z` to `9999-12-31T23:59:59.999Z`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Timestamp(i64);

impl Timestamp {
    /// The minimum supported `Timestamp`: `0000-01-01T00:00:00.000Z`.
    pub const MIN: Timestamp = Timestamp(-62_167_219_200_000);
    /// The maximum supported `Timestamp`: `9999-12-31T23:59:59.999Z`.
    pub const MAX: Timestamp = Timestamp(253_402_300_799_999);

    /// Creates a new `Timestamp` from a `chrono::DateTime<Utc>`, truncating to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the year is outside the supported range of `0` to `9999`.
    pub fn new(datetime: DateTime<Utc>) -> Result<Timestamp, TimestampError> {
        let year = datetime.year();
        if !(0..=9999).contains(&year) {
            return Err(TimestampError::InvalidYear(year));
        }
        Ok(Timestamp(datetime.timestamp_millis()))
    }

    /// The current wall-clock time.
    pub fn now() -> Timestamp {
        // the system clock is not going to report a year past 9999.
        Timestamp(Utc::now().timestamp_millis().clamp(Self::MIN.0, Self::MAX.0))
    }

    /// Creates a `Timestamp` from a number of milliseconds since the UNIX epoch.
    ///
    /// Returns `None` if the number of milliseconds is outside the supported range.
    pub fn from_millis(milliseconds: i64) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&milliseconds)
            .then_some(Self(milliseconds))
    }

    /// Returns the number of milliseconds since the UNIX epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub(crate) fn as_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0)
            .expect("range is checked on construction and fits chrono")
    }
}

impl fmt::Display for Timestamp {
    // RFC 3339 with millisecond precision.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(
            &self
                .as_datetime()
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        )
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let datetime =
            DateTime::parse_from_rfc3339(s).map_err(|_| TimestampError::Parse(s.to_string()))?;
        Timestamp::new(datetime.to_utc())
    }
}

#[cfg(feature = "json")]
impl From<Timestamp> for serde_json::Value {
    fn from(value: Timestamp) -> Self {
        serde_json::Value::String(value.to_string())
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for Timestamp {
    // anywhere between year 0 and 9999
    fn arbitrary(g: &mut quickcheck::Gen) -> Timestamp {
        let range = Self::MAX.0 - Self::MIN.0;
        let random: i64 = quickcheck::Arbitrary::arbitrary(g);
        Timestamp(Self::MIN.0 + random.rem_euclid(range))
    }
}
