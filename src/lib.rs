//! Per-client sliding-window rate limiting gateway.
//!
//! [`rate_limit::AdmissionTracker`] holds the decision engine; the remaining
//! modules wrap it in an axum gateway.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod sweeper;

pub use error::{GateError, Result};
pub use rate_limit::{AdmissionTracker, Decision, WindowConfig};
