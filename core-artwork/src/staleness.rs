//! Staleness comparison primitive
//!
//! Decides whether an artifact whose source-of-truth modification time is
//! `candidate` is newer than the last successful sync recorded for its
//! subscription.

use chrono::{DateTime, Utc};
use tracing::warn;

/// True iff `candidate` is newer than the recorded `last_sync` time.
///
/// `last_sync` is the raw string persisted with the subscription. A value
/// that fails to parse is treated as stale (fail-open): always resync
/// rather than silently never-sync. An idempotent re-push is the cheaper
/// failure mode.
pub fn is_stale(last_sync: &str, candidate: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(last_sync) {
        Ok(t) => t.with_timezone(&Utc) < candidate,
        Err(_) => {
            warn!(last_sync, "unparseable last sync time, treating as stale");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn feb(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn newer_candidate_is_stale() {
        assert!(is_stale("2024-02-01T00:00:00Z", feb(2)));
    }

    #[test]
    fn older_candidate_is_fresh() {
        assert!(!is_stale("2024-02-03T00:00:00Z", feb(2)));
    }

    #[test]
    fn equal_timestamps_are_fresh() {
        assert!(!is_stale("2024-02-02T00:00:00Z", feb(2)));
    }

    #[test]
    fn parse_failure_is_fail_open() {
        assert!(is_stale("not-a-timestamp", feb(2)));
        assert!(is_stale("", feb(2)));
    }

    #[test]
    fn offset_timestamps_compare_in_utc() {
        // 01:00 at +02:00 is 23:00 UTC the previous day.
        assert!(is_stale(
            "2024-02-02T01:00:00+02:00",
            Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()
        ));
    }
}
