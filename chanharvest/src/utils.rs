//! Shared helpers and constants.

use chrono::{DateTime, Utc};

pub const APP_NAME: &str = "chanharvest";

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Converts an upstream epoch-seconds timestamp to an RFC 3339 string.
/// Zero or out-of-range values fall back to the current time.
pub fn epoch_to_iso(ts: i64) -> String {
    if ts <= 0 {
        return now_utc_iso();
    }
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(now_utc_iso)
}
