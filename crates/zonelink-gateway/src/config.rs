//! Gateway configuration.
//!
//! Loaded from a YAML file:
//!
//! ```yaml
//! serial_number: 42
//! cloud:
//!   url: ws://hub.example.net:63240/ws
//! serial:
//!   port: /dev/ttyAMA0
//! logging:
//!   filter: info
//! ```
//!
//! Line settings (115200 8N1) are fixed by the controller and not configurable.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zonelink_protocol::DEFAULT_STATION_ADDRESS;

use crate::error::{GatewayError, GatewayResult};

fn default_station_address() -> i32 {
    DEFAULT_STATION_ADDRESS
}

fn default_reconnect_interval_secs() -> u64 {
    4
}

fn default_serial_port() -> String {
    "/dev/ttyAMA0".to_string()
}

fn default_read_timeout_ms() -> u64 {
    200
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Identity announced to the hub.
    pub serial_number: i64,
    /// Address written into outbound frame headers.
    #[serde(default = "default_station_address")]
    pub station_address: i32,
    /// Fixed delay between connection attempts.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    pub cloud: CloudConfig,
    /// Defaults to `/dev/ttyAMA0`.
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Cloud hub connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// `ws://` URL of the hub endpoint.
    pub url: String,
    /// How long a socket read may hold the connection before letting a
    /// pending write through.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Bound on connecting and on waiting for the greeting ack. A hub that
    /// stays silent past it is treated like a rejection and retried.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// Serial line to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path.
    #[serde(default = "default_serial_port")]
    pub port: String,
    /// Driver read timeout. Bounds how long a stopped telemetry pump takes
    /// to notice.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: default_serial_port(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for the Prometheus endpoint. Needs the `prometheus`
    /// feature.
    #[serde(default)]
    pub prometheus_listen: Option<SocketAddr>,
}

impl GatewayConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| GatewayError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GatewayConfig =
            serde_yaml::from_str(&contents).map_err(|source| GatewayError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.serial_number < 1 {
            errors.push(format!("serial_number must be positive, got {}", self.serial_number));
        }
        if self.cloud.url.trim().is_empty() {
            errors.push("cloud.url may not be empty".to_string());
        } else if !self.cloud.url.starts_with("ws://") {
            errors.push(format!("cloud.url must use ws://, got '{}'", self.cloud.url));
        }
        if self.cloud.poll_interval_ms == 0 {
            errors.push("cloud.poll_interval_ms must be non-zero".to_string());
        }
        if self.cloud.handshake_timeout_ms == 0 {
            errors.push("cloud.handshake_timeout_ms must be non-zero".to_string());
        }
        if self.serial.port.trim().is_empty() {
            errors.push("serial.port may not be empty".to_string());
        }
        if self.serial.read_timeout_ms == 0 {
            errors.push("serial.read_timeout_ms must be non-zero".to_string());
        }
        if self.reconnect_interval_secs == 0 {
            errors.push("reconnect_interval_secs must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Validation(errors.join("; ")))
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.cloud.handshake_timeout_ms)
    }
}
