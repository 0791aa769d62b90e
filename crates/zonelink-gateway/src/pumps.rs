//! The two bridge pumps.
//!
//! Each pump runs on its own named thread and exits after its first
//! terminal error, which it reports on the failure channel unless the
//! supervisor has already stopped the cycle.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, trace, warn};
use zonelink_metrics::{metric_defs, MetricLabels};
use zonelink_protocol::{Envelope, FrameBody, FrameReader, OutboundCommand, ProtocolError};

use crate::error::LinkError;
use crate::link::{Channel, GatedReader, LinkFailure, LinkState, MessageReader, SharedWriter};

/// What a pump needs besides its link halves.
#[derive(Clone)]
pub struct PumpContext {
    /// Bridging cycle, stamped on every reported failure.
    pub generation: u64,
    /// Address written into outbound frame headers.
    pub station_address: i32,
    /// Its `reading` flag tells a teardown from a real failure.
    pub state: Arc<LinkState>,
    /// The supervisor's failure channel.
    pub failures: Sender<LinkFailure>,
    pub labels: MetricLabels,
}

impl PumpContext {
    fn fail(&self, pump: &str, channel: Channel, error: LinkError) {
        if !self.state.is_reading() {
            debug!("{} pump (generation {}) stopped: {}", pump, self.generation, error);
            return;
        }
        warn!("{} pump (generation {}) failed on {}: {}", pump, self.generation, channel, error);
        let _ = self.failures.send(LinkFailure {
            generation: self.generation,
            channel,
            error,
        });
    }
}

// ============================================================================
// Telemetry Pump (controller → cloud)
// ============================================================================

/// Spawn the serial → cloud pump.
pub fn spawn_telemetry_pump(
    ctx: PumpContext,
    serial: Box<dyn Read + Send>,
    writer: SharedWriter,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("telemetry-{}", ctx.generation))
        .spawn(move || run_telemetry_pump(ctx, serial, writer))
}

fn run_telemetry_pump(ctx: PumpContext, serial: Box<dyn Read + Send>, writer: SharedWriter) {
    let mut frames = FrameReader::new(GatedReader::new(serial, ctx.state.clone()));

    loop {
        let frame = match frames.next_frame() {
            Ok(frame) => frame,
            Err(e) => return ctx.fail("telemetry", Channel::Serial, e.into()),
        };

        let code = frame.header.command_code;
        metrics::counter!(
            metric_defs::SERIAL_FRAMES.name,
            &ctx.labels.with("code", code)
        )
        .increment(1);

        let record = match frame.body {
            FrameBody::Telemetry { record, crc } => {
                trace!("code {} from {} crc={:?}", code, frame.header.address, crc);
                record
            }
            FrameBody::Unconsumed | FrameBody::Unknown => {
                metrics::counter!(
                    metric_defs::SERIAL_FRAMES_SKIPPED.name,
                    &ctx.labels.with("code", code)
                )
                .increment(1);
                continue;
            }
        };

        let text = match Envelope::from_telemetry(&record).and_then(|e| e.to_json()) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode {} telemetry: {}", record.kind(), e);
                continue;
            }
        };

        let written = writer.lock().write_message(&text);
        if let Err(e) = written {
            return ctx.fail("telemetry", Channel::Cloud, e);
        }

        debug!("forwarded {} telemetry", record.kind());
        metrics::counter!(
            metric_defs::TELEMETRY_FORWARDED.name,
            &ctx.labels.with("tag", record.tag())
        )
        .increment(1);
    }
}

// ============================================================================
// Command Pump (cloud → controller)
// ============================================================================

/// Spawn the cloud → serial pump.
pub fn spawn_command_pump(
    ctx: PumpContext,
    reader: Box<dyn MessageReader>,
    serial: Box<dyn Write + Send>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("commands-{}", ctx.generation))
        .spawn(move || run_command_pump(ctx, reader, serial))
}

fn record_drop(ctx: &PumpContext, reason: &'static str) {
    metrics::counter!(
        metric_defs::COMMANDS_DROPPED.name,
        &ctx.labels.with("reason", reason)
    )
    .increment(1);
}

fn run_command_pump(
    ctx: PumpContext,
    mut reader: Box<dyn MessageReader>,
    mut serial: Box<dyn Write + Send>,
) {
    loop {
        let message = match reader.read_message() {
            Ok(message) => message,
            Err(e) => return ctx.fail("command", Channel::Cloud, e),
        };
        debug!("received command: {}", String::from_utf8_lossy(&message));

        let envelope = match Envelope::from_slice(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping cloud message: {}", e);
                record_drop(&ctx, "json");
                continue;
            }
        };

        let command = match OutboundCommand::from_envelope(&envelope) {
            Ok(command) => command,
            Err(e @ ProtocolError::UnknownCommandType(_)) => {
                warn!("dropping cloud message: {}", e);
                record_drop(&ctx, "unknown_type");
                continue;
            }
            Err(e) => {
                warn!("dropping cloud message: {}", e);
                record_drop(&ctx, "payload");
                continue;
            }
        };

        let frame = command.encode(ctx.station_address);
        if let Err(e) = serial.write_all(&frame).and_then(|_| serial.flush()) {
            return ctx.fail("command", Channel::Serial, e.into());
        }

        debug!(
            "wrote {} command for gateway {} ({} bytes)",
            command.command_type(),
            command.serial_number(),
            frame.len()
        );
        metrics::counter!(
            metric_defs::COMMANDS_ENCODED.name,
            &ctx.labels.with("type", command.command_type().tag())
        )
        .increment(1);
        metrics::counter!(metric_defs::SERIAL_TX_BYTES.name, &ctx.labels.to_labels())
            .increment(frame.len() as u64);
    }
}
