//! Link state and the transport seam.
//!
//! A connected link is handed out as separate halves: the reader goes to one
//! pump, the writer to the other (or behind the shared write lock), and the
//! [`Closer`] stays with the supervisor. Closing is the only way to stop a
//! pump blocked on I/O.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::{LinkError, LinkResult};

// ============================================================================
// Transport Traits
// ============================================================================

/// Reads whole messages from the cloud socket.
pub trait MessageReader: Send {
    /// Wait at most `timeout` for the next text or binary message.
    /// `Ok(None)` means nothing arrived in time.
    fn poll_message(&mut self, timeout: Duration) -> LinkResult<Option<Vec<u8>>>;

    /// Block until the next message. Only a link error ends the wait.
    fn read_message(&mut self) -> LinkResult<Vec<u8>> {
        loop {
            if let Some(message) = self.poll_message(Duration::from_secs(1))? {
                return Ok(message);
            }
        }
    }
}

/// Writes whole messages to the cloud socket.
pub trait MessageWriter: Send {
    fn write_message(&mut self, text: &str) -> LinkResult<()>;
}

/// Closes a link so that blocked reads and writes on its halves fail.
pub trait Closer: Send + Sync {
    fn close(&self);
}

/// An open cloud socket.
pub struct CloudChannel {
    /// Used for the handshake ack, then owned by the command pump.
    pub reader: Box<dyn MessageReader>,
    /// Goes behind the [`SharedWriter`] lock.
    pub writer: Box<dyn MessageWriter>,
    /// Kept by the supervisor.
    pub closer: Box<dyn Closer>,
}

/// An open serial port.
pub struct SerialChannel {
    /// Owned by the telemetry pump.
    pub reader: Box<dyn Read + Send>,
    /// Owned by the command pump.
    pub writer: Box<dyn Write + Send>,
    /// Kept by the supervisor.
    pub closer: Box<dyn Closer>,
}

/// Opens the two links.
pub trait Transport: Send + Sync {
    /// Connect the cloud socket. The greeting is sent by the caller.
    fn dial_cloud(&self) -> LinkResult<CloudChannel>;

    /// Open the serial port with the controller's line settings.
    fn open_serial(&self) -> LinkResult<SerialChannel>;
}

/// The single write lock on the cloud socket.
pub type SharedWriter = Arc<Mutex<Box<dyn MessageWriter>>>;

// ============================================================================
// Link State
// ============================================================================

/// Supervisor phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Nothing open. Also the final phase after shutdown.
    Disconnected,
    /// Dialing the hub and waiting for the greeting ack.
    ConnectingSocket,
    /// Socket up, opening the serial port.
    ConnectingSerial,
    /// Both pumps running.
    Bridging,
}

/// Which link a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The controller's serial port.
    Serial,
    /// The hub's WebSocket.
    Cloud,
}

impl Channel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::Serial => "serial",
            Channel::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error reported by a pump.
#[derive(Debug)]
pub struct LinkFailure {
    /// Bridging cycle the pump belonged to.
    pub generation: u64,
    /// Link whose read or write failed.
    pub channel: Channel,
    pub error: LinkError,
}

/// Connection state shared between the supervisor and the pumps.
///
/// Only the supervisor changes readiness and the phase. Pumps read the
/// `reading` flag to tell a teardown from a real failure.
#[derive(Debug)]
pub struct LinkState {
    serial_ready: AtomicBool,
    socket_ready: AtomicBool,
    reading: AtomicBool,
    phase: RwLock<LinkPhase>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    pub fn new() -> Self {
        LinkState {
            serial_ready: AtomicBool::new(false),
            socket_ready: AtomicBool::new(false),
            reading: AtomicBool::new(false),
            phase: RwLock::new(LinkPhase::Disconnected),
        }
    }

    pub fn serial_ready(&self) -> bool {
        self.serial_ready.load(Ordering::Acquire)
    }

    pub fn socket_ready(&self) -> bool {
        self.socket_ready.load(Ordering::Acquire)
    }

    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> LinkPhase {
        *self.phase.read()
    }

    pub(crate) fn set_serial_ready(&self, ready: bool) {
        self.serial_ready.store(ready, Ordering::Release);
    }

    pub(crate) fn set_socket_ready(&self, ready: bool) {
        self.socket_ready.store(ready, Ordering::Release);
    }

    pub(crate) fn set_reading(&self, reading: bool) {
        self.reading.store(reading, Ordering::Release);
    }

    pub(crate) fn set_phase(&self, phase: LinkPhase) {
        *self.phase.write() = phase;
    }

    /// Stop the pumps' loops and mark both links down.
    pub(crate) fn mark_down(&self) {
        self.set_reading(false);
        self.set_serial_ready(false);
        self.set_socket_ready(false);
    }
}

// ============================================================================
// Gated Reader
// ============================================================================

/// Serial reader that keeps waiting through driver timeouts while the link
/// is up and gives up once the `reading` flag is cleared.
pub struct GatedReader<R> {
    inner: R,
    state: Arc<LinkState>,
}

impl<R: Read> GatedReader<R> {
    pub fn new(inner: R, state: Arc<LinkState>) -> Self {
        GatedReader { inner, state }
    }
}

impl<R: Read> Read for GatedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.state.is_reading() {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "serial reading stopped",
                ));
            }
            match self.inner.read(buf) {
                Ok(0) if !buf.is_empty() => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "serial port returned EOF"))
                }
                Ok(n) => return Ok(n),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }
}
