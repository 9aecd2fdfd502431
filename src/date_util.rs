use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parse a query-string instant.
///
/// Accepts RFC 3339 (`2024-01-01T12:00:00Z`, `2024-01-01T12:00:00.250+02:00`),
/// a naive timestamp (`2024-01-01T12:00:00`, taken as UTC) and a bare date
/// (`2024-01-01`, midnight UTC).
pub fn parse_instant(name: &str, s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(Error::InvalidParameter(format!(
        "{name} must be an ISO date or RFC 3339 instant, got '{s}'"
    )))
}

/// Storage format for timestamps: UTC, millisecond precision, `Z` suffix.
/// Fixed width, so lexical order is chronological.
pub fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Length of the span between two instants, in fractional days.
pub fn span_days(start: &DateTime<Utc>, end: &DateTime<Utc>) -> f64 {
    (*end - *start).num_milliseconds() as f64 / MILLIS_PER_DAY
}
