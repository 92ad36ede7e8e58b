//! Utility functions and helpers.

pub mod http;

use chrono::{DateTime, TimeZone, Utc};

/// Convert epoch seconds to a UTC timestamp.
///
/// Out-of-range values collapse to the epoch rather than failing; upstream
/// timestamps are untrusted input.
pub fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
