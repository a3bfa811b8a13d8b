use clap::Parser;
use std::time::Duration;

use crate::error::{GateError, Result};
use crate::rate_limit::{WindowConfig, validate_shard_amount};

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "window-gate")]
#[command(about = "Per-client sliding window rate limiting gateway")]
pub struct Args {
    /// Address to bind the server on
    #[arg(long, env = "GATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to run the server on
    #[arg(short, long, env = "GATE_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Max requests admitted per client per window
    #[arg(long, env = "GATE_RATE_LIMIT", default_value_t = 5)]
    pub rate_limit: usize,

    /// Rate limit window in seconds
    #[arg(long, env = "GATE_RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    /// Seconds between sweeps of idle clients (0 disables eviction)
    #[arg(long, env = "GATE_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,

    /// Lock shards for client histories (power of two, defaults to a CPU based amount)
    #[arg(long, env = "GATE_SHARDS")]
    pub shards: Option<usize>,
}

impl Args {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn window_config(&self) -> Result<WindowConfig> {
        if self.rate_limit == 0 {
            return Err(GateError::Config("rate limit must be at least 1".to_string()));
        }
        if self.rate_window == 0 {
            return Err(GateError::Config(
                "rate window must be at least 1 second".to_string(),
            ));
        }
        Ok(WindowConfig::new(
            self.rate_limit,
            Duration::from_secs(self.rate_window),
        ))
    }

    /// Validated shard amount, `None` when left to dashmap.
    pub fn shard_amount(&self) -> Result<Option<usize>> {
        self.shards.map(validate_shard_amount).transpose()
    }

    pub fn sweep_every(&self) -> Option<Duration> {
        (self.sweep_interval > 0).then(|| Duration::from_secs(self.sweep_interval))
    }
}
