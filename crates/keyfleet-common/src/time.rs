// ============================================
// File: crates/keyfleet-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Main Functionality
//! - `now_utc`: Wall-clock timestamp for row metadata
//! - `unix_timestamp_millis`: Current time in the unit panels report
//! - `is_recently_seen`: Liveness check against a panel's `lastOnline`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Panels report `lastOnline` in milliseconds; 0 means "never seen"
//! - Freshness of cached data is measured with monotonic `Instant`s in
//!   the server crate, not with these wall-clock helpers
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Default window within which a client counts as recently active.
pub const DEFAULT_ACTIVE_WINDOW: Duration = Duration::from_secs(120);

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Returns the current Unix timestamp in milliseconds.
#[must_use]
pub fn unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Checks whether a `last_seen_ms` timestamp falls within `window` of `now_ms`.
///
/// A zero or negative `last_seen_ms` means the client was never seen.
/// Timestamps slightly in the future (clock skew between us and the node)
/// still count as seen.
#[must_use]
pub fn is_recently_seen(last_seen_ms: i64, now_ms: i64, window: Duration) -> bool {
    if last_seen_ms <= 0 {
        return false;
    }
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(last_seen_ms) < window_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recently_seen_inside_window() {
        let now = 1_700_000_000_000;
        assert!(is_recently_seen(now - 30_000, now, DEFAULT_ACTIVE_WINDOW));
        assert!(is_recently_seen(now - 119_999, now, DEFAULT_ACTIVE_WINDOW));
    }

    #[test]
    fn test_recently_seen_outside_window() {
        let now = 1_700_000_000_000;
        assert!(!is_recently_seen(now - 120_000, now, DEFAULT_ACTIVE_WINDOW));
        assert!(!is_recently_seen(now - 3_600_000, now, DEFAULT_ACTIVE_WINDOW));
    }

    #[test]
    fn test_never_seen() {
        assert!(!is_recently_seen(0, unix_timestamp_millis(), DEFAULT_ACTIVE_WINDOW));
    }

    #[test]
    fn test_clock_skew_counts_as_seen() {
        let now = 1_700_000_000_000;
        assert!(is_recently_seen(now + 5_000, now, DEFAULT_ACTIVE_WINDOW));
    }
}
