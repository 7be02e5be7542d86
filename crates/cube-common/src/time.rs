//! Instant and duration handling for cube time axes.
//!
//! User-visible instants are ISO-8601 with an explicit `+00:00` offset;
//! durations accept compact forms (`1D`, `1H`, `10m`) as well as the
//! serialized `D days HH:MM:SS` form, and always render as the latter.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse an instant from RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`, or a bare
/// date (midnight UTC).
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }

    Err(TimeParseError::InvalidInstant(s.to_string()))
}

/// Render an instant as ISO-8601 with the explicit `+00:00` offset.
pub fn format_instant(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// A closed time range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Midpoint of the range, at second resolution.
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.duration().num_seconds() / 2)
    }

    /// Widen the range symmetrically by `delta` on both ends.
    pub fn widen(&self, delta: TimeDelta) -> Self {
        Self {
            start: self.start - delta.as_duration(),
            end: self.end + delta.as_duration(),
        }
    }
}

/// A non-negative duration with pandas-style string forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeDelta(Duration);

impl TimeDelta {
    pub fn minutes(minutes: i64) -> Self {
        Self(Duration::minutes(minutes))
    }

    pub fn days(days: i64) -> Self {
        Self(Duration::days(days))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn num_seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Duration::zero()
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.num_seconds();
        let days = total.div_euclid(86_400);
        let rem = total.rem_euclid(86_400);
        write!(
            f,
            "{} days {:02}:{:02}:{:02}",
            days,
            rem / 3_600,
            (rem % 3_600) / 60,
            rem % 60
        )
    }
}

impl FromStr for TimeDelta {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        // Serialized form: "D days HH:MM:SS".
        if let Some((days, hms)) = s.split_once(" days ").or_else(|| s.split_once(" day ")) {
            let days: i64 = days
                .parse()
                .map_err(|_| TimeParseError::InvalidDuration(s.to_string()))?;
            let mut parts = hms.split(':');
            let (h, m, sec) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(m), Some(sec), None) => (h, m, sec),
                _ => return Err(TimeParseError::InvalidDuration(s.to_string())),
            };
            let h: i64 = h
                .parse()
                .map_err(|_| TimeParseError::InvalidDuration(s.to_string()))?;
            let m: i64 = m
                .parse()
                .map_err(|_| TimeParseError::InvalidDuration(s.to_string()))?;
            let sec: i64 = sec
                .parse()
                .map_err(|_| TimeParseError::InvalidDuration(s.to_string()))?;
            return Ok(Self(
                Duration::days(days) + Duration::hours(h) + Duration::minutes(m) + Duration::seconds(sec),
            ));
        }

        // Compact form: "<n><unit>", e.g. "8D", "1H", "10m".
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| TimeParseError::InvalidDuration(s.to_string()))?;
        let (num, unit) = s.split_at(split);
        let n: i64 = num
            .parse()
            .map_err(|_| TimeParseError::InvalidDuration(s.to_string()))?;
        let duration = match unit {
            "W" | "w" => Duration::weeks(n),
            "D" | "d" => Duration::days(n),
            "H" | "h" => Duration::hours(n),
            "T" | "m" | "min" => Duration::minutes(n),
            "S" | "s" => Duration::seconds(n),
            _ => return Err(TimeParseError::InvalidDuration(s.to_string())),
        };
        Ok(Self(duration))
    }
}

impl TryFrom<String> for TimeDelta {
    type Error = TimeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeDelta> for String {
    fn from(delta: TimeDelta) -> Self {
        delta.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("invalid time format: {0}")]
    InvalidInstant(String),

    #[error("invalid duration format: {0}")]
    InvalidDuration(String),
}
