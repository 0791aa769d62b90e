//! Zone Controller Serial Protocol
//!
//! Types and codecs for talking to the building-automation zone controller
//! over its serial line, plus the JSON envelope used on the cloud socket.
//!
//! # Protocol Overview
//!
//! Every serial frame has the same outer layout (all integers little-endian):
//!
//! ```text
//! +----------+--------+---------+------+---------------+---------+
//! | 55 AA 55 | length | address | code | payload ...   | trailer |
//! | AA       | i16    | i32     | u8   | (per code)    | u16     |
//! +----------+--------+---------+------+---------------+---------+
//! ```
//!
//! - **Outbound commands** (host → controller) are built from a cloud
//!   [`Envelope`] by [`OutboundCommand`] and always end in [`TRAILER`].
//! - **Telemetry** (controller → host) is located by the [`PreambleScanner`]
//!   and decoded by [`FrameReader`] into [`Telemetry`] records.
//!
//! The envelope tag space is shared between both directions but means
//! different things in each; see [`CommandType`] and [`Telemetry::tag`].
//!
//! # Example
//!
//! ```rust,ignore
//! use zonelink_protocol::{Envelope, FrameReader, OutboundCommand, DEFAULT_STATION_ADDRESS};
//!
//! // cloud -> device
//! let envelope = Envelope::from_json(&text)?;
//! let bytes = OutboundCommand::from_envelope(&envelope)?.encode(DEFAULT_STATION_ADDRESS);
//!
//! // device -> cloud
//! let mut reader = FrameReader::new(serial);
//! let frame = reader.next_frame()?;
//! if let Some(record) = frame.telemetry() {
//!     let json = Envelope::from_telemetry(record)?.to_json()?;
//! }
//! ```
//!
//! # Injection Side
//!
//! Clients that push commands into the hub on behalf of a user (a REST
//! front-end, for example) build the same envelopes the gateway consumes.
//! [`Envelope::from_command`] produces them, and
//! [`OutboundCommand::with_unset_humidity_defaults`] turns omitted humidity
//! fields into the controller's "leave unchanged" values. The gateway itself
//! encodes commands exactly as received.
//!
//! ```rust
//! use zonelink_protocol::{Envelope, HumidityCommand, OutboundCommand, HUMIDITY_UNCHANGED};
//!
//! let command = OutboundCommand::Humidity(HumidityCommand {
//!     serial_number: 42,
//!     zone: 3,
//!     humidity: 0.0,
//!     hysteresis: 2,
//! })
//! .with_unset_humidity_defaults();
//! assert_eq!(command.serial_number(), 42);
//!
//! let envelope = Envelope::from_command(&command).unwrap();
//! assert_eq!(envelope.command, 9);
//!
//! let OutboundCommand::Humidity(received) = OutboundCommand::from_envelope(&envelope).unwrap()
//! else {
//!     panic!("expected a humidity command");
//! };
//! assert_eq!(received.humidity, HUMIDITY_UNCHANGED);
//! assert_eq!(received.hysteresis, 2);
//! ```

mod commands;
mod constants;
mod envelope;
mod error;
mod frame;
mod telemetry;

pub use commands::*;
pub use constants::*;
pub use envelope::*;
pub use error::*;
pub use frame::*;
pub use telemetry::*;
