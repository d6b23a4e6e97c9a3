//! Timestamp formatting and lenient parsing.
//!
//! Persisted timestamps and live frames use second-precision RFC 3339 in
//! UTC (`2024-05-01T09:30:00Z`). Remote APIs are less consistent, so
//! [`parse_timestamp`] also accepts offsets without a colon, naive
//! date-times, and bare dates.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Current time formatted for persistence and live frames.
pub fn utc_now() -> String {
    format_timestamp(Utc::now())
}

/// Format a timestamp as second-precision RFC 3339 UTC.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a timestamp string, returning `None` when no known layout matches.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, layout) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
