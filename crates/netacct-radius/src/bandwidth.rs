//! Bandwidth delta accounting
//!
//! Switches report cumulative counters. The cache keeps the last value per
//! session and each interim/stop record contributes only what grew since.
//! Read-compute-replace is done without a lock: all records for a session land
//! on one worker lane, so there is a single writer per key.

use crate::cache::SessionCaches;
use netacct_common::AcctSession;
use std::time::Duration;

/// Bytes transferred since the previous report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthDelta {
    pub in_bytes: u64,
    pub out_bytes: u64,
}

impl BandwidthDelta {
    /// Delta from `previous` to `current`; a counter that went backwards yields 0
    pub fn between(previous: Option<&AcctSession>, current: &AcctSession) -> Self {
        let base = previous.copied().unwrap_or_default();
        Self {
            in_bytes: current.in_bytes.saturating_sub(base.in_bytes),
            out_bytes: current.out_bytes.saturating_sub(base.out_bytes),
        }
    }

    pub fn total(&self) -> u64 {
        self.in_bytes.saturating_add(self.out_bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.in_bytes == 0 && self.out_bytes == 0
    }
}

/// Applies cumulative reports to the accounting session cache
pub struct BandwidthAccountant<'a> {
    caches: &'a SessionCaches,
}

impl<'a> BandwidthAccountant<'a> {
    pub fn new(caches: &'a SessionCaches) -> Self {
        Self { caches }
    }

    /// Compute the delta against the cached session and store `current`
    pub fn apply(
        &self,
        node_id: u64,
        unique_session_id: u64,
        current: AcctSession,
    ) -> BandwidthDelta {
        let previous = self.caches.get_acct_session(node_id, unique_session_id);
        let delta = BandwidthDelta::between(previous.as_ref(), &current);
        self.caches.set_acct_session(node_id, unique_session_id, current);
        delta
    }
}

/// Start of the bucket containing `timestamp_ms`, in millis
pub fn time_bucket(timestamp_ms: i64, bucket: Duration) -> i64 {
    let width = bucket.as_millis() as i64;
    if width <= 0 {
        return timestamp_ms;
    }
    timestamp_ms - timestamp_ms.rem_euclid(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_from_nothing_is_full_value() {
        let delta = BandwidthDelta::between(None, &AcctSession::new(100, 40));
        assert_eq!(delta, BandwidthDelta { in_bytes: 100, out_bytes: 40 });
        assert_eq!(delta.total(), 140);
    }

    #[test]
    fn test_counter_reset_floors_at_zero() {
        let previous = AcctSession::new(500, 10);
        let delta = BandwidthDelta::between(Some(&previous), &AcctSession::new(100, 30));
        assert_eq!(delta, BandwidthDelta { in_bytes: 0, out_bytes: 20 });
    }

    #[test]
    fn test_apply_replaces_cached_value() {
        let caches = SessionCaches::new();
        let accountant = BandwidthAccountant::new(&caches);

        caches.set_acct_session(1, 1, AcctSession::default());
        assert_eq!(
            accountant.apply(1, 1, AcctSession::new(100, 50)),
            BandwidthDelta { in_bytes: 100, out_bytes: 50 }
        );
        assert_eq!(
            accountant.apply(1, 1, AcctSession::new(250, 60)),
            BandwidthDelta { in_bytes: 150, out_bytes: 10 }
        );
        assert_eq!(caches.get_acct_session(1, 1), Some(AcctSession::new(250, 60)));
    }

    #[test]
    fn test_interim_without_entry_creates_one() {
        let caches = SessionCaches::new();
        let accountant = BandwidthAccountant::new(&caches);

        let delta = accountant.apply(7, 9, AcctSession::new(10, 20));
        assert_eq!(delta, BandwidthDelta { in_bytes: 10, out_bytes: 20 });
        assert_eq!(caches.get_acct_session(7, 9), Some(AcctSession::new(10, 20)));
    }

    #[test]
    fn test_time_bucket() {
        let five_min = Duration::from_secs(300);
        assert_eq!(time_bucket(299_999, five_min), 0);
        assert_eq!(time_bucket(300_000, five_min), 300_000);
        assert_eq!(time_bucket(1_000_123, five_min), 900_000);
        assert_eq!(time_bucket(42, Duration::ZERO), 42);
    }
}
