//! Telemetry records decoded from controller frames.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::frame::{FieldReader, FrameHeader};

/// Air conditions for one zone (code 0). The zone is the frame address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AirReading {
    /// Copied from the frame header address.
    pub zone: i32,
    /// Air temperature, °C.
    pub temp_air: f32,
    /// Sent as a float, truncated towards zero.
    pub humidity_air: i32,
    /// Floor temperature, °C.
    pub tempfloor: f32,
    /// CO2 concentration, ppm. Sent as an integer.
    pub co_2: f32,
}

/// Temperature setpoint for one zone (code 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSetpoint {
    pub zone: i32,
    /// Target temperature, °C.
    pub setpoint_value_temp: f32,
    /// Regulating sensor. Sent biased by one.
    pub type_regulation: u8,
}

/// Vent speed for one zone (code 3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VentSpeed {
    pub zone: i16,
    /// Fan speed step.
    pub vent_speed: i16,
}

/// Vent module settings for one zone (code 7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VentModuleState {
    pub zone: i16,
    /// Fan speed step.
    pub vent_speed: i16,
    /// Regulation dead band.
    pub delta: u8,
    /// Regulating sensor. Not biased in this layout.
    pub type_regulation: u8,
    /// Damper cycling interval.
    pub interval_time_ventilation_dampers: u8,
    /// Extra ventilation time once CO2 has dropped.
    pub ventilation_period_after_co_2_reduction_time: u8,
}

/// Humidity setpoint and hysteresis for one zone (code 8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HumiditySetpoint {
    pub zone: i32,
    /// Target relative humidity, %.
    pub setpoint: f32,
    /// Sent biased by one.
    pub hysteresis: u8,
}

/// A decoded telemetry record.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// Code 0, tag 1.
    AirReading(AirReading),
    /// Code 1, tag 2.
    ZoneSetpoints([ZoneSetpoint; SETPOINT_RECORDS]),
    /// Code 3, tag 3.
    VentSpeeds([VentSpeed; VENT_SPEED_RECORDS]),
    /// Code 7, tag 7.
    VentModuleState(VentModuleState),
    /// Code 8, tag 8.
    HumiditySetpoints([HumiditySetpoint; SETPOINT_RECORDS]),
}

impl Telemetry {
    /// Envelope tag used when forwarding this record to the cloud.
    pub fn tag(&self) -> i64 {
        match self {
            Telemetry::AirReading(_) => TAG_AIR_READING,
            Telemetry::ZoneSetpoints(_) => TAG_ZONE_SETPOINTS,
            Telemetry::VentSpeeds(_) => TAG_VENT_SPEEDS,
            Telemetry::VentModuleState(_) => TAG_VENT_MODULE_STATE,
            Telemetry::HumiditySetpoints(_) => TAG_HUMIDITY_SETPOINTS,
        }
    }

    /// Wire command code this record was decoded from.
    pub fn command_code(&self) -> u8 {
        match self {
            Telemetry::AirReading(_) => CODE_AIR_READING,
            Telemetry::ZoneSetpoints(_) => CODE_ZONE_SETPOINTS,
            Telemetry::VentSpeeds(_) => CODE_VENT_SPEEDS,
            Telemetry::VentModuleState(_) => CODE_VENT_MODULE_STATE,
            Telemetry::HumiditySetpoints(_) => CODE_HUMIDITY_SETPOINTS,
        }
    }

    /// Short name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Telemetry::AirReading(_) => "air_reading",
            Telemetry::ZoneSetpoints(_) => "zone_setpoints",
            Telemetry::VentSpeeds(_) => "vent_speeds",
            Telemetry::VentModuleState(_) => "vent_module_state",
            Telemetry::HumiditySetpoints(_) => "humidity_setpoints",
        }
    }

    /// JSON value for the envelope `data` field. Tables become arrays.
    pub fn to_data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Telemetry::AirReading(r) => serde_json::to_value(r),
            Telemetry::ZoneSetpoints(r) => serde_json::to_value(r),
            Telemetry::VentSpeeds(r) => serde_json::to_value(r),
            Telemetry::VentModuleState(r) => serde_json::to_value(r),
            Telemetry::HumiditySetpoints(r) => serde_json::to_value(r),
        }
    }
}

/// What the decoder did with a frame's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// A record was decoded. `crc` is the raw value from the wire, if the
    /// layout carries one; it is never validated.
    Telemetry { record: Telemetry, crc: Option<u16> },
    /// Known code whose payload is left in the stream.
    Unconsumed,
    /// Code with no known layout. Nothing past the header was read.
    Unknown,
}

/// A frame as read from the serial stream.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Header as sent. The declared length is not checked.
    pub header: FrameHeader,
    pub body: FrameBody,
}

impl InboundFrame {
    /// The decoded record, if any.
    pub fn telemetry(&self) -> Option<&Telemetry> {
        match &self.body {
            FrameBody::Telemetry { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn into_telemetry(self) -> Option<Telemetry> {
        match self.body {
            FrameBody::Telemetry { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Undo the controller's +1 bias on small enumerated fields.
fn unbias(raw: u8) -> u8 {
    raw.wrapping_sub(1)
}

fn read_zone_setpoint<R: Read>(src: &mut FieldReader<R>) -> io::Result<ZoneSetpoint> {
    let zone = src.read_i32()?;
    let setpoint_value_temp = src.read_f32()?;
    let type_regulation = unbias(src.read_u8()?);
    Ok(ZoneSetpoint {
        zone,
        setpoint_value_temp,
        type_regulation,
    })
}

fn read_humidity_setpoint<R: Read>(src: &mut FieldReader<R>) -> io::Result<HumiditySetpoint> {
    let zone = src.read_i32()?;
    let setpoint = src.read_f32()?;
    let hysteresis = unbias(src.read_u8()?);
    Ok(HumiditySetpoint {
        zone,
        setpoint,
        hysteresis,
    })
}

fn read_vent_speed<R: Read>(src: &mut FieldReader<R>) -> io::Result<VentSpeed> {
    let zone = src.read_i16()?;
    let vent_speed = src.read_i16()?;
    Ok(VentSpeed { zone, vent_speed })
}

fn read_table<R, T, const N: usize>(
    src: &mut FieldReader<R>,
    read: fn(&mut FieldReader<R>) -> io::Result<T>,
) -> io::Result<[T; N]>
where
    R: Read,
    T: Copy + Default,
{
    let mut records = [T::default(); N];
    for record in records.iter_mut() {
        *record = read(src)?;
    }
    Ok(records)
}

/// Read the crc and the pad byte that close the table layouts.
fn read_table_tail<R: Read>(src: &mut FieldReader<R>) -> io::Result<u16> {
    let crc = src.read_u16()?;
    let _pad = src.read_u8()?;
    Ok(crc)
}

/// Decode the payload that follows `header`.
///
/// Codes 2, 4, 5 and 6 leave their payload in the stream and code 7 has no
/// crc; the next [`crate::FrameReader::sync`] skips whatever is left.
pub(crate) fn decode_body<R: Read>(
    header: FrameHeader,
    src: &mut FieldReader<R>,
) -> io::Result<InboundFrame> {
    src.mark();

    let body = match header.command_code {
        CODE_AIR_READING => {
            let temp_air = src.read_f32()?;
            let humidity_air = src.read_f32()? as i32;
            let tempfloor = src.read_f32()?;
            let co_2 = src.read_i32()? as f32;
            let crc = src.read_u16()?;
            FrameBody::Telemetry {
                record: Telemetry::AirReading(AirReading {
                    zone: header.address,
                    temp_air,
                    humidity_air,
                    tempfloor,
                    co_2,
                }),
                crc: Some(crc),
            }
        }

        CODE_ZONE_SETPOINTS => {
            let records: [ZoneSetpoint; SETPOINT_RECORDS] = read_table(src, read_zone_setpoint)?;
            let crc = read_table_tail(src)?;
            FrameBody::Telemetry {
                record: Telemetry::ZoneSetpoints(records),
                crc: Some(crc),
            }
        }

        CODE_VENT_SPEEDS => {
            let records: [VentSpeed; VENT_SPEED_RECORDS] = read_table(src, read_vent_speed)?;
            let crc = read_table_tail(src)?;
            FrameBody::Telemetry {
                record: Telemetry::VentSpeeds(records),
                crc: Some(crc),
            }
        }

        CODE_VENT_MODULE_STATE => {
            let zone = src.read_i16()?;
            let vent_speed = src.read_i16()?;
            let delta = src.read_u8()?;
            let type_regulation = src.read_u8()?;
            let interval_time_ventilation_dampers = src.read_u8()?;
            let ventilation_period_after_co_2_reduction_time = src.read_u8()?;
            FrameBody::Telemetry {
                record: Telemetry::VentModuleState(VentModuleState {
                    zone,
                    vent_speed,
                    delta,
                    type_regulation,
                    interval_time_ventilation_dampers,
                    ventilation_period_after_co_2_reduction_time,
                }),
                crc: None,
            }
        }

        CODE_HUMIDITY_SETPOINTS => {
            let records: [HumiditySetpoint; SETPOINT_RECORDS] =
                read_table(src, read_humidity_setpoint)?;
            let crc = read_table_tail(src)?;
            FrameBody::Telemetry {
                record: Telemetry::HumiditySetpoints(records),
                crc: Some(crc),
            }
        }

        CODE_SETPOINT_ECHO | CODE_VENT_MODULE_ECHO | CODE_VENT_ALL_ECHO | CODE_VENT_ZONE_ECHO => {
            log::debug!(
                "command code {} from address {}: payload not consumed",
                header.command_code,
                header.address
            );
            FrameBody::Unconsumed
        }

        other => {
            log::warn!("unknown command code {} from address {}", other, header.address);
            FrameBody::Unknown
        }
    };

    if matches!(body, FrameBody::Telemetry { .. }) {
        let actual = HEADER_LEN + src.consumed();
        if header.declared_length as i64 != actual as i64 {
            log::trace!(
                "code {}: declared length {} but {} bytes follow the length field",
                header.command_code,
                header.declared_length,
                actual
            );
        }
    }

    Ok(InboundFrame { header, body })
}
