//! Logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{GatewayError, GatewayResult};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter. Records emitted through the
/// `log` crate (the protocol crate logs that way) are forwarded into
/// `tracing`.
pub fn init_logging(config: &LoggingConfig) -> GatewayResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| GatewayError::Logging(format!("bad filter '{}': {}", config.filter, e)))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| GatewayError::Logging(e.to_string()))
}
