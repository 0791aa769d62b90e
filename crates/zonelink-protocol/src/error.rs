//! Protocol error types.

use thiserror::Error;

/// Errors raised while translating between the JSON envelope and the wire.
///
/// Byte-source failures are not represented here: the frame reader returns
/// plain [`std::io::Error`] so callers can treat them as transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Envelope tag does not name an outbound command type.
    #[error("unknown command type: {0}")]
    UnknownCommandType(i64),

    /// Envelope `data` does not match the shape for its command type.
    #[error("invalid payload for command type {command_type}: {reason}")]
    InvalidPayload {
        /// Tag the payload was decoded against.
        command_type: i64,
        /// Decoder message.
        reason: String,
    },

    /// Text is not a valid envelope.
    #[error("malformed envelope: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Json(err.to_string())
    }
}
