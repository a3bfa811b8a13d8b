use std::sync::Arc;
use crate::rate_limit::AdmissionTracker;

// app's shared state
pub struct AppState {
    pub tracker: Arc<AdmissionTracker>, // shared with the sweeper task
}

impl AppState {
    pub fn new(tracker: Arc<AdmissionTracker>) -> Self {
        Self { tracker }
    }
}
