use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUESTS_TOTAL: Counter =
        register_counter!("gate_requests_total", "Total number of gated requests").unwrap();
    pub static ref REQUESTS_ADMITTED: Counter =
        register_counter!("gate_requests_admitted_total", "Gated requests admitted").unwrap();
    pub static ref REQUESTS_REJECTED: Counter =
        register_counter!("gate_requests_rejected_total", "Gated requests rejected").unwrap();
    pub static ref CLIENTS_EVICTED: Counter =
        register_counter!("gate_clients_evicted_total", "Idle clients evicted by the sweeper").unwrap();
    pub static ref CHECK_DURATION: Histogram = register_histogram!(
        "gate_check_duration_seconds",
        "Time spent in the admission check"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("gate_tracked_clients", "Current number of clients with a request history").unwrap();
}

// Register every metric up front so /metrics lists them before first use
pub fn init() {
    lazy_static::initialize(&REQUESTS_TOTAL);
    lazy_static::initialize(&REQUESTS_ADMITTED);
    lazy_static::initialize(&REQUESTS_REJECTED);
    lazy_static::initialize(&CLIENTS_EVICTED);
    lazy_static::initialize(&CHECK_DURATION);
    lazy_static::initialize(&TRACKED_CLIENTS);
}
