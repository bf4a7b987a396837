//! Timestamp handling for reservations and stored records
//!
//! All timestamps are UTC. They are persisted as fixed-width RFC 3339 text
//! (`2026-01-31T09:15:00.000000Z`) so that lexical order in SQL equals
//! chronological order, which the expiry sweep relies on.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use super::errors::DomainError;

/// Minutes a reservation holds a number before it may be swept
pub const HOLD_DURATION_MINUTES: i64 = 15;

/// The fixed reservation hold as a duration
pub fn hold_duration() -> Duration {
    Duration::minutes(HOLD_DURATION_MINUTES)
}

/// `reserved_until` for a reservation created or extended at `now`
pub fn reservation_deadline(now: DateTime<Utc>) -> DateTime<Utc> {
    now + hold_duration()
}

/// Format a timestamp in the canonical storage form
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored or user-supplied timestamp
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// forms, the latter interpreted as UTC.
///
/// # Errors
/// Returns `DomainError::InvalidTimestamp` if no format matches
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| DomainError::InvalidTimestamp(format!("'{s}': {e}")))
}

/// Parse a date-range bound for audit searches
///
/// A bare date (`YYYY-MM-DD`) is widened to the start of that day, or to its
/// last second when `end` is true. Anything else must be a full timestamp.
///
/// # Errors
/// Returns `DomainError::InvalidTimestamp` if the input is neither form
pub fn parse_date_bound(input: &str, end: bool) -> Result<DateTime<Utc>, DomainError> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let time = if end {
            date.and_hms_micro_opt(23, 59, 59, 999_999)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        return time
            .map(|ndt| ndt.and_utc())
            .ok_or_else(|| DomainError::InvalidTimestamp(input.to_string()));
    }
    parse_timestamp(input)
}
