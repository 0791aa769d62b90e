//! JSON envelope exchanged with the cloud hub.
//!
//! ```json
//! {"command": 3, "data": {...}}
//! ```
//!
//! `command` is omitted when zero and `data` when null, matching what the
//! hub itself emits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::OutboundCommand;
use crate::constants::CLIENT_ROLE;
use crate::error::ProtocolError;
use crate::telemetry::Telemetry;

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Tagged message on the cloud socket, in either direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Telemetry tag or command type, depending on direction.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub command: i64,
    /// Record or command payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Envelope {
    /// Wrap a decoded record for the cloud.
    pub fn from_telemetry(record: &Telemetry) -> Result<Self, ProtocolError> {
        Ok(Envelope {
            command: record.tag(),
            data: record.to_data()?,
        })
    }

    /// Wrap an outbound command. Used by injection clients that build the
    /// same envelopes the hub delivers.
    pub fn from_command(command: &OutboundCommand) -> Result<Self, ProtocolError> {
        Ok(Envelope {
            command: command.command_type().tag(),
            data: command.to_data()?,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// First message sent after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    /// Gateway identity the hub routes on.
    pub serial_number: i64,
    /// Client role, always [`CLIENT_ROLE`] for a gateway.
    pub type_client: String,
}

impl Greeting {
    /// Greeting for a controller gateway.
    pub fn controller(serial_number: i64) -> Self {
        Greeting {
            serial_number,
            type_client: CLIENT_ROLE.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
