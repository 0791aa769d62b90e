//! Gateway error types.

use std::path::PathBuf;

use thiserror::Error;
use zonelink_protocol::ProtocolError;

/// Failure of one of the two links. Always ends the current bridging cycle.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Socket or serial I/O, including a failed dial.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket framing or upgrade failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Port could not be opened or cloned.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// Hub answered the greeting with something other than the ack.
    #[error("handshake rejected: {0:?}")]
    Handshake(String),

    /// Hub accepted the connection but never acknowledged.
    #[error("no handshake ack within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// Shutdown was requested while connecting.
    #[error("connect cancelled by shutdown")]
    Cancelled,

    /// Greeting could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Startup errors. These are the only errors that end the process.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Config file missing or unreadable.
    #[error("failed to read configuration from {path:?}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for [`crate::GatewayConfig`].
    #[error("failed to parse configuration at {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Every problem found by `validate`, joined.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// A global subscriber was already set, or the filter is malformed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// Exporter could not bind, or the binary was built without it.
    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),
}

/// Result type for startup.
pub type GatewayResult<T> = Result<T, GatewayError>;
