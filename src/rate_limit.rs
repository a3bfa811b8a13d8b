//! Per-client sliding-window admission tracking.
//!
//! Every client id owns a chronological list of request timestamps. A check
//! prunes the timestamps that fell out of the window, records the current
//! request and compares the count against the limit. Rejected requests are
//! recorded too, so a client retrying while limited keeps its window full.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{GateError, Result};

// Bucket shared by every caller that does not identify itself
pub const ANONYMOUS: &str = "anonymous";

// Window parameters, fixed for the lifetime of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub limit: usize,     // max requests admitted per window
    pub window: Duration, // length of the sliding window
}

impl WindowConfig {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Outcome of a single admission check.
///
/// `retry_after` assumes the client sends nothing more in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted { remaining: usize },
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }
}

/// Map the empty id onto the anonymous bucket.
pub fn normalize_client_id(client_id: &str) -> &str {
    if client_id.is_empty() {
        ANONYMOUS
    } else {
        client_id
    }
}

// dashmap asserts on any other amount
pub fn validate_shard_amount(shard_amount: usize) -> Result<usize> {
    if shard_amount < 2 || !shard_amount.is_power_of_two() {
        return Err(GateError::Config(format!(
            "shard amount must be a power of two greater than 1, got {}",
            shard_amount
        )));
    }
    Ok(shard_amount)
}

/// Request history of every client seen, keyed by client id.
///
/// Histories live in a [`DashMap`], which hashes each id to one of several
/// shards guarded by its own lock. A check holds the shard's write lock for
/// the whole prune-append-store sequence, so two concurrent requests from the
/// same client can never both observe a count below the limit, while clients
/// on other shards proceed in parallel.
pub struct AdmissionTracker {
    histories: DashMap<String, VecDeque<Instant>>,
    config: WindowConfig,
}

impl AdmissionTracker {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            histories: DashMap::new(),
            config,
        }
    }

    /// Create a tracker with an explicit number of lock shards, which must
    /// be a power of two greater than one.
    pub fn with_shard_amount(config: WindowConfig, shard_amount: usize) -> Result<Self> {
        let shard_amount = validate_shard_amount(shard_amount)?;
        Ok(Self {
            histories: DashMap::with_shard_amount(shard_amount),
            config,
        })
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Check and record a request arriving now.
    pub fn check_and_record(&self, client_id: &str) -> Decision {
        self.check_and_record_at(client_id, Instant::now())
    }

    /// Check and record a request from `client_id` arriving at `now`.
    ///
    /// A timestamp counts as recent while `now - t <= window`. The current
    /// request is part of the count it is judged by: the call is rejected when
    /// the recent timestamps, this one included, exceed the limit.
    pub fn check_and_record_at(&self, client_id: &str, now: Instant) -> Decision {
        let WindowConfig { limit, window } = self.config;
        let key = normalize_client_id(client_id);

        // shard write lock held until `history` drops
        let mut history = self.histories.entry(key.to_string()).or_default();

        // a caller running behind the newest entry must not break ordering
        let now = history.back().map_or(now, |&newest| now.max(newest));

        while let Some(&oldest) = history.front() {
            if now.duration_since(oldest) > window {
                history.pop_front();
            } else {
                break;
            }
        }
        history.push_back(now);

        // Recent entries always form a suffix, so anything beyond the newest
        // `limit + 1` cannot change a later decision.
        while history.len() > limit.saturating_add(1) {
            history.pop_front();
        }

        if history.len() > limit {
            // Once this entry ages out only `limit - 1` recent ones remain.
            let retry_after = history
                .get(history.len() - limit)
                .and_then(|pivot| pivot.checked_add(window))
                .map_or(window, |free_at| free_at.saturating_duration_since(now));
            Decision::Rejected { retry_after }
        } else {
            Decision::Admitted {
                remaining: limit - history.len(),
            }
        }
    }

    /// Number of timestamps stored for a client, 0 if it was never seen.
    pub fn history_len(&self, client_id: &str) -> usize {
        self.histories
            .get(normalize_client_id(client_id))
            .map_or(0, |history| history.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.histories.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict every client whose whole history has left the window.
    ///
    /// Such a client would start from an empty history on its next check
    /// anyway, so eviction never changes a decision. Returns the number of
    /// clients removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut evicted = 0;
        self.histories.retain(|_, history| {
            let live = history
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) <= window);
            if !live {
                evicted += 1;
            }
            live
        });
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn tracker(limit: usize, window_secs: u64) -> AdmissionTracker {
        AdmissionTracker::new(WindowConfig::new(limit, secs(window_secs)))
    }

    // t=0..4 admitted, t=5 rejected
    fn exhausted_at_five(t0: Instant) -> AdmissionTracker {
        let tracker = tracker(5, 60);
        for i in 0..5 {
            let decision = tracker.check_and_record_at("u1", t0 + secs(i));
            assert!(decision.is_admitted(), "call at t={} should be admitted", i);
        }
        assert!(tracker.check_and_record_at("u1", t0 + secs(5)).is_rejected());
        tracker
    }

    #[test]
    fn test_scenario_limit_five_window_sixty() {
        let t0 = Instant::now();

        // t=0 has aged out, t=1..5 are at most 60s old
        let tracker = exhausted_at_five(t0);
        assert!(tracker.check_and_record_at("u1", t0 + secs(61)).is_rejected());

        // t=1 has aged out too
        let tracker = exhausted_at_five(t0);
        assert!(tracker.check_and_record_at("u1", t0 + secs(62)).is_admitted());
    }

    #[test]
    fn test_rejected_call_is_recorded() {
        let t0 = Instant::now();
        let tracker = exhausted_at_five(t0);

        // the rejected t=61 stays recent and keeps t=62 over the limit
        assert!(tracker.check_and_record_at("u1", t0 + secs(61)).is_rejected());
        assert!(tracker.check_and_record_at("u1", t0 + secs(62)).is_rejected());
        assert!(tracker.check_and_record_at("u1", t0 + secs(66)).is_admitted());
    }

    #[test]
    fn test_threshold() {
        let tracker = tracker(3, 10);
        let t0 = Instant::now();

        assert_eq!(
            tracker.check_and_record_at("c", t0),
            Decision::Admitted { remaining: 2 }
        );
        assert_eq!(
            tracker.check_and_record_at("c", t0 + Duration::from_millis(10)),
            Decision::Admitted { remaining: 1 }
        );
        assert_eq!(
            tracker.check_and_record_at("c", t0 + secs(9)),
            Decision::Admitted { remaining: 0 }
        );
        assert!(tracker.check_and_record_at("c", t0 + secs(9)).is_rejected());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let tracker = tracker(1, 10);
        let t0 = Instant::now();

        assert!(tracker.check_and_record_at("c", t0).is_admitted());
        // exactly one window old still counts
        assert!(tracker.check_and_record_at("c", t0 + secs(10)).is_rejected());
    }

    #[test]
    fn test_window_expiry() {
        let tracker = tracker(2, 10);
        let t0 = Instant::now();

        tracker.check_and_record_at("c", t0);
        tracker.check_and_record_at("c", t0);
        assert!(tracker.check_and_record_at("c", t0).is_rejected());

        let later = t0 + secs(10) + Duration::from_millis(1);
        assert!(tracker.check_and_record_at("c", later).is_admitted());
        assert_eq!(tracker.history_len("c"), 1);
    }

    #[test]
    fn test_retry_storm_delays_recovery() {
        let tracker = tracker(5, 60);
        let t0 = Instant::now();

        for client in ["storm", "patient"] {
            for i in 0..5 {
                assert!(tracker.check_and_record_at(client, t0 + secs(i)).is_admitted());
            }
            assert!(tracker.check_and_record_at(client, t0 + secs(5)).is_rejected());
        }

        // "storm" keeps retrying every second, "patient" goes quiet
        for i in 6..62 {
            assert!(tracker.check_and_record_at("storm", t0 + secs(i)).is_rejected());
        }

        assert!(tracker.check_and_record_at("patient", t0 + secs(62)).is_admitted());
        assert!(tracker.check_and_record_at("storm", t0 + secs(62)).is_rejected());
        // well past a full window after its last admitted request
        assert!(tracker.check_and_record_at("storm", t0 + secs(90)).is_rejected());
    }

    #[test]
    fn test_clients_are_isolated() {
        let tracker = tracker(2, 60);
        let t0 = Instant::now();

        for _ in 0..10 {
            tracker.check_and_record_at("a", t0);
        }
        assert!(tracker.check_and_record_at("a", t0).is_rejected());
        assert_eq!(
            tracker.check_and_record_at("b", t0),
            Decision::Admitted { remaining: 1 }
        );
    }

    #[test]
    fn test_history_length_bounded() {
        let tracker = tracker(4, 60);
        let t0 = Instant::now();

        assert_eq!(tracker.history_len("c"), 0);
        for i in 0..50 {
            tracker.check_and_record_at("c", t0 + Duration::from_millis(i * 100));
            let len = tracker.history_len("c");
            assert!((1..=5).contains(&len), "history length {} out of bounds", len);
        }
    }

    #[test]
    fn test_empty_id_shares_anonymous_bucket() {
        let tracker = tracker(2, 60);
        let t0 = Instant::now();

        assert!(tracker.check_and_record_at("", t0).is_admitted());
        assert!(tracker.check_and_record_at(ANONYMOUS, t0).is_admitted());
        assert!(tracker.check_and_record_at("", t0).is_rejected());
        assert_eq!(tracker.tracked_clients(), 1);
        assert_eq!(tracker.history_len(""), 3);
    }

    #[test]
    fn test_out_of_order_now_keeps_history_chronological() {
        let tracker = tracker(2, 10);
        let t0 = Instant::now();

        tracker.check_and_record_at("c", t0 + secs(5));
        tracker.check_and_record_at("c", t0);
        // both entries are treated as t=5, so t=16 sees nothing recent
        assert_eq!(
            tracker.check_and_record_at("c", t0 + secs(16)),
            Decision::Admitted { remaining: 1 }
        );
    }

    #[test]
    fn test_retry_after() {
        let tracker = tracker(5, 60);
        let t0 = Instant::now();

        for i in 0..5 {
            tracker.check_and_record_at("u1", t0 + secs(i));
        }
        // t=1 has to age out, which happens just after t=61
        assert_eq!(
            tracker.check_and_record_at("u1", t0 + secs(5)),
            Decision::Rejected { retry_after: secs(56) }
        );
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let tracker = tracker(0, 10);
        let t0 = Instant::now();

        assert_eq!(
            tracker.check_and_record_at("c", t0),
            Decision::Rejected { retry_after: secs(10) }
        );
        assert_eq!(tracker.history_len("c"), 1);
    }

    #[test]
    fn test_sweep_evicts_only_expired_clients() {
        let tracker = tracker(3, 10);
        let t0 = Instant::now();

        tracker.check_and_record_at("idle", t0);
        tracker.check_and_record_at("busy", t0);
        tracker.check_and_record_at("busy", t0 + secs(8));

        assert_eq!(tracker.sweep_at(t0 + secs(10)), 0);
        assert_eq!(tracker.sweep_at(t0 + secs(11)), 1);
        assert_eq!(tracker.tracked_clients(), 1);
        assert_eq!(tracker.history_len("idle"), 0);
        assert_eq!(tracker.history_len("busy"), 2);
    }

    #[test]
    fn test_evicted_client_starts_fresh() {
        let tracker = tracker(1, 10);
        let t0 = Instant::now();

        tracker.check_and_record_at("c", t0);
        assert!(tracker.check_and_record_at("c", t0 + secs(1)).is_rejected());

        assert_eq!(tracker.sweep_at(t0 + secs(12)), 1);
        assert!(tracker.check_and_record_at("c", t0 + secs(12)).is_admitted());
    }

    #[test]
    fn test_explicit_shard_amount() {
        let tracker = match AdmissionTracker::with_shard_amount(WindowConfig::new(1, secs(60)), 8) {
            Ok(tracker) => tracker,
            Err(e) => panic!("8 shards should be accepted: {}", e),
        };
        let t0 = Instant::now();

        for i in 0..32 {
            let id = format!("client-{}", i);
            assert!(tracker.check_and_record_at(&id, t0).is_admitted());
            assert!(tracker.check_and_record_at(&id, t0).is_rejected());
        }
        assert_eq!(tracker.tracked_clients(), 32);
    }

    #[test]
    fn test_invalid_shard_amount_is_an_error() {
        for shards in [0, 1, 3, 12] {
            let result = AdmissionTracker::with_shard_amount(WindowConfig::new(1, secs(60)), shards);
            assert!(
                matches!(result, Err(GateError::Config(_))),
                "{} shards should be rejected",
                shards
            );
        }
    }

    #[test]
    fn test_max_limit_does_not_overflow() {
        let tracker = tracker(usize::MAX, 60);
        let t0 = Instant::now();

        assert_eq!(
            tracker.check_and_record_at("c", t0),
            Decision::Admitted { remaining: usize::MAX - 1 }
        );
        assert_eq!(tracker.history_len("c"), 1);
        assert!(tracker.check_and_record_at("c", t0 + secs(1)).is_admitted());
        assert_eq!(tracker.history_len("c"), 2);
    }
}
