//! Outbound commands (cloud → controller).
//!
//! Each command type maps to a fixed declared length and wire command code.
//! The declared lengths are protocol data copied from the controller
//! firmware and are written as-is, even where they disagree with the number
//! of bytes that follow.

use bytes::BufMut;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::envelope::Envelope;
use crate::error::ProtocolError;
use crate::frame::FrameHeader;

// ============================================================================
// Command Types
// ============================================================================

/// Envelope tag of an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// Set the temperature setpoint of a zone.
    Setpoint,
    /// Select which sensor regulates a zone.
    SensorMode,
    /// Write vent module settings.
    VentModule,
    /// Same wire payload as [`CommandType::VentModule`].
    VentModuleSecondary,
    /// Write vent module timing for every zone.
    VentModuleAll,
    /// Address a single vent zone.
    VentZone,
    /// Set the humidity setpoint and hysteresis of a zone.
    Humidity,
}

/// One row of the outbound frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub command_type: CommandType,
    /// Envelope `command` value.
    pub tag: i64,
    /// Length field written to the header.
    pub declared_length: i16,
    /// Wire command code.
    pub command_code: u8,
}

const fn layout(command_type: CommandType, tag: i64, declared_length: i16, command_code: u8) -> FrameLayout {
    FrameLayout {
        command_type,
        tag,
        declared_length,
        command_code,
    }
}

/// Outbound frame table, in [`CommandType`] declaration order.
pub static FRAME_LAYOUTS: [FrameLayout; 7] = [
    layout(CommandType::Setpoint, 1, 14, 2),
    layout(CommandType::SensorMode, 2, 14, 2),
    layout(CommandType::VentModule, 3, 13, 4),
    layout(CommandType::VentModuleSecondary, 4, 13, 4),
    layout(CommandType::VentModuleAll, 5, 13, 5),
    layout(CommandType::VentZone, 6, 7, 6),
    layout(CommandType::Humidity, 9, 14, 2),
];

impl CommandType {
    /// Look up a command type by envelope tag.
    pub fn from_tag(tag: i64) -> Option<Self> {
        FRAME_LAYOUTS
            .iter()
            .find(|l| l.tag == tag)
            .map(|l| l.command_type)
    }

    pub fn layout(self) -> &'static FrameLayout {
        &FRAME_LAYOUTS[self as usize]
    }

    pub fn tag(self) -> i64 {
        self.layout().tag
    }

    pub fn declared_length(self) -> i16 {
        self.layout().declared_length
    }

    pub fn command_code(self) -> u8 {
        self.layout().command_code
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandType::Setpoint => "setpoint",
            CommandType::SensorMode => "sensor_mode",
            CommandType::VentModule => "vent_module",
            CommandType::VentModuleSecondary => "vent_module_secondary",
            CommandType::VentModuleAll => "vent_module_all",
            CommandType::VentZone => "vent_zone",
            CommandType::Humidity => "humidity",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Payloads
// ============================================================================
//
// Missing fields decode as zero. `serial_number` identifies the target
// gateway on the hub and is not written to the wire.

/// Payload for [`CommandType::Setpoint`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointCommand {
    pub serial_number: i64,
    /// Target temperature, °C.
    pub temperature: f32,
    /// Narrowed to i32 on the wire.
    pub zone: i64,
}

/// Payload for [`CommandType::SensorMode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorModeCommand {
    pub serial_number: i64,
    /// Regulating sensor. Written as a single byte.
    #[serde(rename = "type")]
    pub sensor_type: i64,
    /// Narrowed to i32 on the wire.
    pub zone: i64,
}

/// Payload for [`CommandType::VentModule`] and [`CommandType::VentModuleSecondary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VentModuleCommand {
    pub serial_number: i64,
    pub zone: i16,
    /// Fan speed step.
    pub vent_speed: i16,
    /// Regulation dead band.
    pub delta: u8,
    /// Regulating sensor.
    pub type_regulation: u8,
    /// Damper cycling interval.
    pub interval_time_ventilation_dampers: u8,
    /// Extra ventilation time once CO2 has dropped.
    pub ventilation_period_after_co_2_reduction_time: u8,
    /// Apply to every zone. Zone and speed are written as zero.
    pub for_all: bool,
}

/// Payload for [`CommandType::VentModuleAll`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VentModuleAllCommand {
    pub serial_number: i64,
    /// See [`VentModuleCommand::delta`].
    pub delta: u8,
    pub type_regulation: u8,
    pub interval_time_ventilation_dampers: u8,
    pub ventilation_period_after_co_2_reduction_time: u8,
}

/// Payload for [`CommandType::VentZone`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VentZoneCommand {
    pub serial_number: i64,
    pub zone: i16,
}

/// Payload for [`CommandType::Humidity`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumidityCommand {
    pub serial_number: i64,
    pub zone: i32,
    /// Target relative humidity, %. [`HUMIDITY_UNCHANGED`] keeps the current one.
    pub humidity: f32,
    /// [`HYSTERESIS_UNCHANGED`] keeps the current one.
    pub hysteresis: u8,
}

/// Humidity value the controller reads as "keep current setpoint".
pub const HUMIDITY_UNCHANGED: f32 = f32::MAX;
/// Hysteresis value the controller reads as "keep current hysteresis".
pub const HYSTERESIS_UNCHANGED: u8 = u8::MAX;

// ============================================================================
// Outbound Command
// ============================================================================

/// A command ready to be written to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// Type 1.
    Setpoint(SetpointCommand),
    /// Type 2.
    SensorMode(SensorModeCommand),
    /// Type 3.
    VentModule(VentModuleCommand),
    /// Type 4. Encoded exactly like type 3.
    VentModuleSecondary(VentModuleCommand),
    /// Type 5.
    VentModuleAll(VentModuleAllCommand),
    /// Type 6.
    VentZone(VentZoneCommand),
    /// Type 9.
    Humidity(HumidityCommand),
}

fn payload<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, ProtocolError> {
    T::deserialize(&envelope.data).map_err(|e| ProtocolError::InvalidPayload {
        command_type: envelope.command,
        reason: e.to_string(),
    })
}

impl OutboundCommand {
    /// Interpret a cloud envelope as an outbound command.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let command_type = CommandType::from_tag(envelope.command)
            .ok_or(ProtocolError::UnknownCommandType(envelope.command))?;

        Ok(match command_type {
            CommandType::Setpoint => OutboundCommand::Setpoint(payload(envelope)?),
            CommandType::SensorMode => OutboundCommand::SensorMode(payload(envelope)?),
            CommandType::VentModule => OutboundCommand::VentModule(payload(envelope)?),
            CommandType::VentModuleSecondary => {
                OutboundCommand::VentModuleSecondary(payload(envelope)?)
            }
            CommandType::VentModuleAll => OutboundCommand::VentModuleAll(payload(envelope)?),
            CommandType::VentZone => OutboundCommand::VentZone(payload(envelope)?),
            CommandType::Humidity => OutboundCommand::Humidity(payload(envelope)?),
        })
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            OutboundCommand::Setpoint(_) => CommandType::Setpoint,
            OutboundCommand::SensorMode(_) => CommandType::SensorMode,
            OutboundCommand::VentModule(_) => CommandType::VentModule,
            OutboundCommand::VentModuleSecondary(_) => CommandType::VentModuleSecondary,
            OutboundCommand::VentModuleAll(_) => CommandType::VentModuleAll,
            OutboundCommand::VentZone(_) => CommandType::VentZone,
            OutboundCommand::Humidity(_) => CommandType::Humidity,
        }
    }

    /// Serial number of the gateway this command is addressed to.
    pub fn serial_number(&self) -> i64 {
        match self {
            OutboundCommand::Setpoint(c) => c.serial_number,
            OutboundCommand::SensorMode(c) => c.serial_number,
            OutboundCommand::VentModule(c) | OutboundCommand::VentModuleSecondary(c) => {
                c.serial_number
            }
            OutboundCommand::VentModuleAll(c) => c.serial_number,
            OutboundCommand::VentZone(c) => c.serial_number,
            OutboundCommand::Humidity(c) => c.serial_number,
        }
    }

    /// Replace unset humidity fields with the controller's "unchanged"
    /// sentinels. Other command types are returned as-is.
    pub fn with_unset_humidity_defaults(mut self) -> Self {
        if let OutboundCommand::Humidity(c) = &mut self {
            if c.humidity == 0.0 {
                c.humidity = HUMIDITY_UNCHANGED;
            }
            if c.hysteresis == 0 {
                c.hysteresis = HYSTERESIS_UNCHANGED;
            }
        }
        self
    }

    /// JSON value for the envelope `data` field.
    pub fn to_data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            OutboundCommand::Setpoint(c) => serde_json::to_value(c),
            OutboundCommand::SensorMode(c) => serde_json::to_value(c),
            OutboundCommand::VentModule(c) | OutboundCommand::VentModuleSecondary(c) => {
                serde_json::to_value(c)
            }
            OutboundCommand::VentModuleAll(c) => serde_json::to_value(c),
            OutboundCommand::VentZone(c) => serde_json::to_value(c),
            OutboundCommand::Humidity(c) => serde_json::to_value(c),
        }
    }

    /// Encode the full frame: preamble, header, payload and trailer.
    pub fn encode(&self, station_address: i32) -> Vec<u8> {
        let command_type = self.command_type();
        let mut buf = Vec::with_capacity(PREAMBLE.len() + FrameHeader::WIRE_LEN + 9 + 2);

        buf.extend_from_slice(&PREAMBLE);
        FrameHeader {
            declared_length: command_type.declared_length(),
            address: station_address,
            command_code: command_type.command_code(),
        }
        .write_to(&mut buf);

        match self {
            OutboundCommand::Setpoint(c) => {
                buf.put_i32_le(c.zone as i32);
                buf.put_f32_le(c.temperature);
                buf.put_u8(0);
            }

            OutboundCommand::SensorMode(c) => {
                buf.put_i32_le(c.zone as i32);
                buf.put_f32_le(0.0);
                buf.put_u8(c.sensor_type as u8);
            }

            OutboundCommand::VentModule(c) | OutboundCommand::VentModuleSecondary(c) => {
                let (zone, vent_speed) = if c.for_all {
                    (0, 0)
                } else {
                    (c.zone, c.vent_speed)
                };
                buf.put_i16_le(zone);
                buf.put_i16_le(vent_speed);
                buf.put_u8(c.delta);
                buf.put_u8(c.type_regulation);
                buf.put_u8(c.interval_time_ventilation_dampers);
                buf.put_u8(c.ventilation_period_after_co_2_reduction_time);
            }

            OutboundCommand::VentModuleAll(c) => {
                buf.put_i16_le(0);
                buf.put_i16_le(0);
                buf.put_u8(c.delta);
                buf.put_u8(c.type_regulation);
                buf.put_u8(c.interval_time_ventilation_dampers);
                buf.put_u8(c.ventilation_period_after_co_2_reduction_time);
            }

            OutboundCommand::VentZone(c) => {
                buf.put_i16_le(c.zone);
            }

            OutboundCommand::Humidity(c) => {
                buf.put_i32_le(c.zone);
                buf.put_f32_le(c.humidity);
                buf.put_u8(c.hysteresis);
            }
        }

        buf.put_u16_le(TRAILER);
        buf
    }
}
