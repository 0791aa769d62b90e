//! Connection supervisor.
//!
//! ```text
//!            +--------------+   socket + ack    +------------------+
//!  start --> | Connecting   | ----------------> | Connecting       |
//!            | Socket       | <-- retry 4s      | Serial           | <-- retry 4s
//!            +--------------+                   +------------------+
//!                   ^                                   | port open
//!                   |        close both, join pumps     v
//!            +--------------+ <---- failure ----  +------------------+
//!            | Disconnected |                     | Bridging         |
//!            +--------------+                     +------------------+
//! ```
//!
//! The greeting ack is awaited for at most the handshake timeout, and a
//! shutdown request is honoured there too.
//!
//! Exactly one failure is acted on per cycle. Every cycle has a generation
//! number; failures carrying an older generation are dropped.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use zonelink_metrics::{metric_defs, MetricLabels};
use zonelink_protocol::{Greeting, HANDSHAKE_ACK};

use crate::config::GatewayConfig;
use crate::error::{LinkError, LinkResult};
use crate::link::{
    Channel, Closer, LinkFailure, LinkPhase, LinkState, MessageReader, SerialChannel,
    SharedWriter, Transport,
};
use crate::pumps::{spawn_command_pump, spawn_telemetry_pump, PumpContext};

/// Longest single wait for the ack before shutdown is checked again.
const ACK_POLL: Duration = Duration::from_millis(100);

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Identity sent in the greeting.
    pub serial_number: i64,
    /// Address written into outbound frame headers.
    pub station_address: i32,
    /// Fixed wait between failed connection attempts.
    pub reconnect_interval: Duration,
    /// How long to wait for the hub's ack after greeting it.
    pub handshake_timeout: Duration,
    pub labels: MetricLabels,
}

impl SupervisorConfig {
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        SupervisorConfig {
            serial_number: config.serial_number,
            station_address: config.station_address,
            reconnect_interval: config.reconnect_interval(),
            handshake_timeout: config.handshake_timeout(),
            labels: MetricLabels::new(config.serial_number, config.serial.port.clone()),
        }
    }
}

/// Stops a running supervisor from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Sender<()>,
}

impl ShutdownHandle {
    /// Request shutdown. Interrupts backoff waits and bridging.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }

    /// Trigger on SIGINT and SIGTERM. Only one handler may be installed per
    /// process.
    pub fn install_signal_handler(self) -> Result<(), ctrlc::Error> {
        ctrlc::set_handler(move || {
            info!("signal received, shutting down");
            self.trigger();
        })
    }
}

/// Cloud socket after a successful handshake.
struct CloudSession {
    reader: Box<dyn MessageReader>,
    writer: SharedWriter,
    closer: Box<dyn Closer>,
}

/// A running bridging cycle.
struct Bridge {
    generation: u64,
    cloud_closer: Box<dyn Closer>,
    serial_closer: Box<dyn Closer>,
    pumps: Vec<(&'static str, JoinHandle<()>)>,
}

enum Outcome {
    Failed(Channel),
    Shutdown,
}

/// Keeps the serial port and the cloud socket connected and bridged.
pub struct Supervisor<T: Transport> {
    transport: T,
    config: SupervisorConfig,
    state: Arc<LinkState>,
    failures_tx: Sender<LinkFailure>,
    failures_rx: Receiver<LinkFailure>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    /// Set once a shutdown request has been seen.
    stopping: bool,
    generation: u64,
}

impl<T: Transport> Supervisor<T> {
    pub fn new(transport: T, config: SupervisorConfig) -> Self {
        let (failures_tx, failures_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        Supervisor {
            transport,
            config,
            state: Arc::new(LinkState::new()),
            failures_tx,
            failures_rx,
            shutdown_tx,
            shutdown_rx,
            stopping: false,
            generation: 0,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Shared link state, for observation.
    pub fn state(&self) -> Arc<LinkState> {
        self.state.clone()
    }

    /// Run until shutdown is requested. Transport failures never end the loop.
    pub fn run(mut self) {
        info!(
            "gateway {} starting (station address {})",
            self.config.serial_number, self.config.station_address
        );
        let mut failed_at: Option<Instant> = None;

        while !self.stopping {
            let Some(cloud) = self.connect_socket() else {
                break;
            };
            let Some(serial) = self.connect_serial() else {
                cloud.closer.close();
                break;
            };

            let bridge = match self.start_bridge(cloud, serial) {
                Ok(bridge) => bridge,
                Err(e) => {
                    error!("failed to start pumps: {}", e);
                    if self.wait_backoff() {
                        break;
                    }
                    continue;
                }
            };

            if let Some(at) = failed_at.take() {
                metrics::counter!(metric_defs::LINK_RECONNECTS.name, &self.config.labels.to_labels())
                    .increment(1);
                metrics::histogram!(
                    metric_defs::LINK_RECOVERY_TIME.name,
                    &self.config.labels.to_labels()
                )
                .record(at.elapsed().as_secs_f64());
            }

            let outcome = self.wait_for_failure(bridge.generation);
            self.teardown(bridge);

            match outcome {
                Outcome::Shutdown => break,
                Outcome::Failed(channel) => {
                    metrics::counter!(
                        metric_defs::LINK_FAILURES.name,
                        &self.config.labels.with("channel", channel)
                    )
                    .increment(1);
                    failed_at = Some(Instant::now());
                    info!("reconnecting after {} failure", channel);
                }
            }
        }

        self.state.mark_down();
        self.state.set_phase(LinkPhase::Disconnected);
        info!("gateway stopped");
    }

    /// Wait one reconnect interval. Returns `true` if shutdown was requested.
    fn wait_backoff(&mut self) -> bool {
        if !self.stopping {
            match self.shutdown_rx.recv_timeout(self.config.reconnect_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => self.stopping = true,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.stopping
    }

    fn shutdown_requested(&mut self) -> bool {
        if !self.stopping && self.shutdown_rx.try_recv().is_ok() {
            self.stopping = true;
        }
        self.stopping
    }

    fn connect_socket(&mut self) -> Option<CloudSession> {
        self.state.set_phase(LinkPhase::ConnectingSocket);
        loop {
            match self.handshake() {
                Ok(session) => {
                    self.state.set_socket_ready(true);
                    info!("cloud socket connected");
                    return Some(session);
                }
                Err(LinkError::Cancelled) => return None,
                Err(e) => {
                    warn!(
                        "cloud connect failed: {}; retrying in {:?}",
                        e, self.config.reconnect_interval
                    );
                    metrics::counter!(
                        metric_defs::LINK_CONNECT_ATTEMPTS_FAILED.name,
                        &self.config.labels.with("channel", Channel::Cloud)
                    )
                    .increment(1);
                    if self.wait_backoff() {
                        return None;
                    }
                }
            }
        }
    }

    /// Dial, send the greeting under the write lock and wait for the ack.
    fn handshake(&mut self) -> LinkResult<CloudSession> {
        let channel = self.transport.dial_cloud()?;
        let mut reader = channel.reader;
        let writer: SharedWriter = Arc::new(Mutex::new(channel.writer));

        if let Err(e) = self.greet(&writer, reader.as_mut()) {
            channel.closer.close();
            return Err(e);
        }

        Ok(CloudSession {
            reader,
            writer,
            closer: channel.closer,
        })
    }

    fn greet(&mut self, writer: &SharedWriter, reader: &mut dyn MessageReader) -> LinkResult<()> {
        let greeting = Greeting::controller(self.config.serial_number).to_json()?;
        writer.lock().write_message(&greeting)?;

        let deadline = Instant::now() + self.config.handshake_timeout;
        let reply = loop {
            if self.shutdown_requested() {
                return Err(LinkError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::HandshakeTimeout(self.config.handshake_timeout));
            }
            if let Some(reply) = reader.poll_message(remaining.min(ACK_POLL))? {
                break reply;
            }
        };

        if reply != HANDSHAKE_ACK.as_bytes() {
            return Err(LinkError::Handshake(String::from_utf8_lossy(&reply).into_owned()));
        }
        Ok(())
    }

    fn connect_serial(&mut self) -> Option<SerialChannel> {
        self.state.set_phase(LinkPhase::ConnectingSerial);
        loop {
            match self.transport.open_serial() {
                Ok(serial) => {
                    self.state.set_serial_ready(true);
                    info!("serial port opened");
                    return Some(serial);
                }
                Err(e) => {
                    warn!(
                        "serial open failed: {}; retrying in {:?}",
                        e, self.config.reconnect_interval
                    );
                    metrics::counter!(
                        metric_defs::LINK_CONNECT_ATTEMPTS_FAILED.name,
                        &self.config.labels.with("channel", Channel::Serial)
                    )
                    .increment(1);
                    if self.wait_backoff() {
                        return None;
                    }
                }
            }
        }
    }

    fn start_bridge(&mut self, cloud: CloudSession, serial: SerialChannel) -> std::io::Result<Bridge> {
        self.generation += 1;
        let ctx = PumpContext {
            generation: self.generation,
            station_address: self.config.station_address,
            state: self.state.clone(),
            failures: self.failures_tx.clone(),
            labels: self.config.labels.clone(),
        };

        self.state.set_reading(true);
        let mut bridge = Bridge {
            generation: self.generation,
            cloud_closer: cloud.closer,
            serial_closer: serial.closer,
            pumps: Vec::with_capacity(2),
        };

        match spawn_telemetry_pump(ctx.clone(), serial.reader, cloud.writer) {
            Ok(handle) => bridge.pumps.push(("telemetry", handle)),
            Err(e) => {
                self.teardown(bridge);
                return Err(e);
            }
        }
        match spawn_command_pump(ctx, cloud.reader, serial.writer) {
            Ok(handle) => bridge.pumps.push(("command", handle)),
            Err(e) => {
                self.teardown(bridge);
                return Err(e);
            }
        }

        self.state.set_phase(LinkPhase::Bridging);
        metrics::gauge!(metric_defs::LINK_BRIDGING.name, &self.config.labels.to_labels()).set(1.0);
        info!("bridging (generation {})", self.generation);
        Ok(bridge)
    }

    fn wait_for_failure(&self, generation: u64) -> Outcome {
        if self.stopping {
            return Outcome::Shutdown;
        }
        loop {
            select! {
                recv(self.failures_rx) -> failure => match failure {
                    Ok(failure) if failure.generation == generation => {
                        warn!("{} link failed: {}", failure.channel, failure.error);
                        return Outcome::Failed(failure.channel);
                    }
                    Ok(failure) => {
                        debug!(
                            "ignoring {} failure from generation {}: {}",
                            failure.channel, failure.generation, failure.error
                        );
                    }
                    Err(_) => return Outcome::Shutdown,
                },
                recv(self.shutdown_rx) -> _ => return Outcome::Shutdown,
            }
        }
    }

    /// Stop the pumps and release both handles. Returns once both pump
    /// threads have exited.
    fn teardown(&mut self, bridge: Bridge) {
        self.state.mark_down();
        self.state.set_phase(LinkPhase::Disconnected);
        metrics::gauge!(metric_defs::LINK_BRIDGING.name, &self.config.labels.to_labels()).set(0.0);

        bridge.cloud_closer.close();
        bridge.serial_closer.close();

        for (name, handle) in bridge.pumps {
            if handle.join().is_err() {
                error!("{} pump (generation {}) panicked", name, bridge.generation);
            }
        }

        while let Ok(failure) = self.failures_rx.try_recv() {
            debug!(
                "discarding {} failure from generation {}: {}",
                failure.channel, failure.generation, failure.error
            );
        }
        debug!("generation {} torn down", bridge.generation);
    }
}
