//! Timestamp helpers. Everything in the store is Unix seconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parse an RFC 3339 timestamp to Unix seconds, `0` if it does not parse.
pub fn parse_iso_timestamp(s: &str) -> i64 {
    parse_optional_timestamp(Some(s)).unwrap_or(0)
}

/// Parse an optional RFC 3339 timestamp; unparseable values become `None`.
pub fn parse_optional_timestamp(s: Option<&str>) -> Option<i64> {
    let s = s?;
    match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.timestamp()),
        Err(e) => {
            log::debug!("Ignoring unparseable timestamp {:?}: {}", s, e);
            None
        }
    }
}
