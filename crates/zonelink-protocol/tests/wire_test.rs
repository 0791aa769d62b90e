//! End-to-end wire scenarios for the serial protocol.

use proptest::prelude::*;
use serde_json::json;
use zonelink_protocol::*;

/// Leftmost non-overlapping occurrences of the preamble.
fn naive_preamble_count(bytes: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + PREAMBLE.len() <= bytes.len() {
        if bytes[i..i + PREAMBLE.len()] == PREAMBLE {
            count += 1;
            i += PREAMBLE.len();
        } else {
            i += 1;
        }
    }
    count
}

fn scanner_count(bytes: &[u8]) -> usize {
    let mut scanner = PreambleScanner::new();
    bytes.iter().filter(|b| scanner.push(**b)).count()
}

fn line_byte() -> impl Strategy<Value = u8> {
    prop_oneof![
        4 => Just(PREAMBLE_LOW),
        4 => Just(PREAMBLE_HIGH),
        1 => any::<u8>(),
    ]
}

proptest! {
    #[test]
    fn prop_scanner_matches_contiguous_preambles(bytes in prop::collection::vec(line_byte(), 0..256)) {
        prop_assert_eq!(scanner_count(&bytes), naive_preamble_count(&bytes));
    }

    #[test]
    fn prop_no_preamble_no_events(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assume!(naive_preamble_count(&bytes) == 0);
        prop_assert_eq!(scanner_count(&bytes), 0);
    }
}

#[test]
fn test_air_reading_end_to_end() {
    let mut stream = vec![0x13, 0x37, 0x55];
    stream.extend_from_slice(&[0x55, 0xAA, 0x55, 0xAA]);
    stream.extend_from_slice(&[0x0E, 0x00]);
    stream.extend_from_slice(&[0x65, 0x00, 0x00, 0x00]);
    stream.push(0x00);
    stream.extend_from_slice(&[0x00, 0x00, 0x48, 0x42]); // 50.0
    stream.extend_from_slice(&[0x00, 0x00, 0x20, 0x41]); // 10.0
    stream.extend_from_slice(&[0x00, 0x00, 0x70, 0x41]); // 15.0
    stream.extend_from_slice(&[0x64, 0x00, 0x00, 0x00]); // 100
    stream.extend_from_slice(&[0xFF, 0x7F]);

    let mut reader = FrameReader::new(stream.as_slice());
    let frame = reader.next_frame().unwrap();

    assert_eq!(
        frame.header,
        FrameHeader {
            declared_length: 14,
            address: 101,
            command_code: 0,
        }
    );
    assert_eq!(
        frame.body,
        FrameBody::Telemetry {
            record: Telemetry::AirReading(AirReading {
                zone: 101,
                temp_air: 50.0,
                humidity_air: 10,
                tempfloor: 15.0,
                co_2: 100.0,
            }),
            crc: Some(0x7FFF),
        }
    );

    let envelope = Envelope::from_telemetry(frame.telemetry().unwrap()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "command": 1,
            "data": {"zone": 101, "temp_air": 50.0, "humidity_air": 10, "tempfloor": 15.0, "co_2": 100.0}
        })
    );
}

#[test]
fn test_vent_module_roundtrip_header() {
    let command = OutboundCommand::VentModule(VentModuleCommand {
        serial_number: 1,
        zone: 5,
        vent_speed: 10,
        delta: 2,
        type_regulation: 1,
        interval_time_ventilation_dampers: 3,
        ventilation_period_after_co_2_reduction_time: 4,
        for_all: false,
    });
    let bytes = command.encode(DEFAULT_STATION_ADDRESS);

    assert_eq!(&bytes[..4], &PREAMBLE);
    let header = FrameHeader::parse(&bytes[4..]).unwrap();
    assert_eq!(header.command_code, 4);
    assert_eq!(header.declared_length, 13);
    assert_eq!(header.address, DEFAULT_STATION_ADDRESS);

    let payload = &bytes[4 + FrameHeader::WIRE_LEN..];
    assert_eq!(payload, &[5, 0, 10, 0, 2, 1, 3, 4, 0xFF, 0x7F]);
}

#[test]
fn test_for_all_overrides_zone_and_speed() {
    let envelope = Envelope::from_json(
        r#"{"command":4,"data":{"serial_number":1,"zone":7,"vent_speed":9,"delta":1,"type_regulation":2,"for_all":true}}"#,
    )
    .unwrap();
    let bytes = OutboundCommand::from_envelope(&envelope)
        .unwrap()
        .encode(DEFAULT_STATION_ADDRESS);

    let payload = &bytes[4 + FrameHeader::WIRE_LEN..];
    assert_eq!(&payload[..4], &[0, 0, 0, 0]);
    assert_eq!(&payload[4..6], &[1, 2]);
}

#[test]
fn test_bias_on_setpoint_tables() {
    let mut stream = PREAMBLE.to_vec();
    FrameHeader {
        declared_length: 62,
        address: 101,
        command_code: CODE_ZONE_SETPOINTS,
    }
    .write_to(&mut stream);
    for zone in 1..=6i32 {
        stream.extend_from_slice(&zone.to_le_bytes());
        stream.extend_from_slice(&21.0f32.to_le_bytes());
        stream.push(3);
    }
    stream.extend_from_slice(&[0xFF, 0x7F, 0x00]);

    stream.extend_from_slice(&PREAMBLE);
    FrameHeader {
        declared_length: 62,
        address: 101,
        command_code: CODE_HUMIDITY_SETPOINTS,
    }
    .write_to(&mut stream);
    for zone in 1..=6i32 {
        stream.extend_from_slice(&zone.to_le_bytes());
        stream.extend_from_slice(&40.0f32.to_le_bytes());
        stream.push(1);
    }
    stream.extend_from_slice(&[0xFF, 0x7F, 0x00]);

    let mut reader = FrameReader::new(stream.as_slice());

    let Some(Telemetry::ZoneSetpoints(setpoints)) = reader.next_frame().unwrap().into_telemetry()
    else {
        panic!("expected zone setpoints");
    };
    assert!(setpoints.iter().all(|s| s.type_regulation == 2));
    assert_eq!(setpoints[5].zone, 6);

    let Some(Telemetry::HumiditySetpoints(humidity)) =
        reader.next_frame().unwrap().into_telemetry()
    else {
        panic!("expected humidity setpoints");
    };
    assert!(humidity.iter().all(|h| h.hysteresis == 0));
    assert_eq!(humidity[0].setpoint, 40.0);
}

#[test]
fn test_resync_after_unconsumed_payload() {
    let mut stream = PREAMBLE.to_vec();
    FrameHeader {
        declared_length: 14,
        address: 101,
        command_code: CODE_SETPOINT_ECHO,
    }
    .write_to(&mut stream);
    stream.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB4, 0x41, 0x00, 0xFF, 0x7F]);

    stream.extend_from_slice(&PREAMBLE);
    FrameHeader {
        declared_length: 13,
        address: 101,
        command_code: CODE_VENT_MODULE_STATE,
    }
    .write_to(&mut stream);
    stream.extend_from_slice(&[0x02, 0x00, 0x1E, 0x00, 0x01, 0x02, 0x03, 0x04]);

    let mut reader = FrameReader::new(stream.as_slice());
    assert_eq!(reader.next_frame().unwrap().body, FrameBody::Unconsumed);

    let frame = reader.next_frame().unwrap();
    assert_eq!(
        frame.into_telemetry(),
        Some(Telemetry::VentModuleState(VentModuleState {
            zone: 2,
            vent_speed: 30,
            delta: 1,
            type_regulation: 2,
            interval_time_ventilation_dampers: 3,
            ventilation_period_after_co_2_reduction_time: 4,
        }))
    );
}
