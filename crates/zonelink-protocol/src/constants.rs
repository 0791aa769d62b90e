//! Protocol constants
//!
//! Wire markers, command codes and envelope tags shared by the encoder and
//! the decoder.

// ============================================================================
// Framing
// ============================================================================

/// First and third preamble byte.
pub const PREAMBLE_LOW: u8 = 0x55;
/// Second and fourth preamble byte.
pub const PREAMBLE_HIGH: u8 = 0xAA;
/// Marker preceding every frame in both directions.
pub const PREAMBLE: [u8; 4] = [PREAMBLE_LOW, PREAMBLE_HIGH, PREAMBLE_LOW, PREAMBLE_HIGH];

/// Constant trailer appended to outbound frames. Not a checksum.
pub const TRAILER: u16 = 0x7FFF;

/// Address written into every outbound header.
pub const DEFAULT_STATION_ADDRESS: i32 = 101;

/// Size of the address + command code part of the header.
pub const HEADER_LEN: usize = 5;

// ============================================================================
// Telemetry Command Codes (controller → host)
// ============================================================================

/// Air temperature, humidity, floor temperature and CO2 for one zone.
pub const CODE_AIR_READING: u8 = 0;
/// Temperature setpoints for all zones.
pub const CODE_ZONE_SETPOINTS: u8 = 1;
/// Echo of a setpoint write. Payload is not consumed.
pub const CODE_SETPOINT_ECHO: u8 = 2;
/// Vent speeds for all zones.
pub const CODE_VENT_SPEEDS: u8 = 3;
/// Echo of a vent module write. Payload is not consumed.
pub const CODE_VENT_MODULE_ECHO: u8 = 4;
/// Echo of a vent module write addressed to every zone. Payload is not consumed.
pub const CODE_VENT_ALL_ECHO: u8 = 5;
/// Echo of a vent zone query. Payload is not consumed.
pub const CODE_VENT_ZONE_ECHO: u8 = 6;
/// Vent module state for one zone.
pub const CODE_VENT_MODULE_STATE: u8 = 7;
/// Humidity setpoints for all zones.
pub const CODE_HUMIDITY_SETPOINTS: u8 = 8;

/// Records in a setpoint table (codes 1 and 8).
pub const SETPOINT_RECORDS: usize = 6;
/// Records in a vent speed table (code 3).
pub const VENT_SPEED_RECORDS: usize = 9;

// ============================================================================
// Envelope Tags (controller → cloud)
// ============================================================================

/// Tag for [`CODE_AIR_READING`] records.
pub const TAG_AIR_READING: i64 = 1;
/// Tag for [`CODE_ZONE_SETPOINTS`] records.
pub const TAG_ZONE_SETPOINTS: i64 = 2;
/// Tag for [`CODE_VENT_SPEEDS`] records.
pub const TAG_VENT_SPEEDS: i64 = 3;
/// Tag for [`CODE_VENT_MODULE_STATE`] records.
pub const TAG_VENT_MODULE_STATE: i64 = 7;
/// Tag for [`CODE_HUMIDITY_SETPOINTS`] records.
pub const TAG_HUMIDITY_SETPOINTS: i64 = 8;

// ============================================================================
// Socket Handshake
// ============================================================================

/// Role announced in the greeting.
pub const CLIENT_ROLE: &str = "controller";
/// Literal reply that accepts the greeting.
pub const HANDSHAKE_ACK: &str = "ok";
