mod api;
mod gate;
mod health;
mod metrics;

pub use api::{data_handler, public_handler, resource_handler};
pub use gate::{CLIENT_ID_HEADER, REJECTION_MESSAGE, client_id, rate_limit_gate};
pub use health::health_handler;
pub use metrics::metrics_handler;
