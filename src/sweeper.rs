use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::metrics::{CLIENTS_EVICTED, TRACKED_CLIENTS};
use crate::rate_limit::AdmissionTracker;

// Evict clients whose whole history expired, runs until the task is dropped
pub async fn eviction_sweeper(tracker: Arc<AdmissionTracker>, every: Duration) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval = ?every, "eviction sweeper started");

    loop {
        interval.tick().await;

        let evicted = tracker.sweep();
        let remaining = tracker.tracked_clients();

        CLIENTS_EVICTED.inc_by(evicted as f64);
        TRACKED_CLIENTS.set(remaining as f64);

        if evicted > 0 {
            debug!(evicted, remaining, "evicted idle clients");
        }
    }
}
