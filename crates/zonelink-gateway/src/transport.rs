//! Real serial and WebSocket transports.

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};

use crate::config::GatewayConfig;
use crate::error::{LinkError, LinkResult};
use crate::link::{CloudChannel, Closer, MessageReader, MessageWriter, SerialChannel, Transport};

/// Controller line speed.
pub const BAUD_RATE: u32 = 115_200;

/// Opens the physical serial port and a plain-TCP WebSocket.
#[derive(Debug, Clone)]
pub struct DeviceTransport {
    /// `ws://` URL of the hub.
    pub cloud_url: String,
    /// Serial device path.
    pub serial_port: String,
    /// Serial driver read timeout.
    pub read_timeout: Duration,
    /// How long a socket read holds the socket lock.
    pub poll_interval: Duration,
    /// Bound on the TCP connect and on the WebSocket upgrade.
    pub connect_timeout: Duration,
}

impl DeviceTransport {
    pub fn from_config(config: &GatewayConfig) -> Self {
        DeviceTransport {
            cloud_url: config.cloud.url.clone(),
            serial_port: config.serial.port.clone(),
            read_timeout: Duration::from_millis(config.serial.read_timeout_ms),
            poll_interval: Duration::from_millis(config.cloud.poll_interval_ms),
            connect_timeout: Duration::from_millis(config.cloud.handshake_timeout_ms),
        }
    }
}

impl Transport for DeviceTransport {
    fn dial_cloud(&self) -> LinkResult<CloudChannel> {
        let request = self.cloud_url.as_str().into_client_request()?;
        let host = request
            .uri()
            .host()
            .ok_or_else(|| LinkError::Handshake(format!("no host in {}", self.cloud_url)))?
            .to_string();
        let port = request.uri().port_u16().unwrap_or(80);

        debug!("dialing {}:{}", host, port);
        let stream = connect_any((host.as_str(), port), self.connect_timeout)?;
        stream.set_nodelay(true)?;
        // A silent server must not stall the upgrade.
        stream.set_read_timeout(Some(self.connect_timeout))?;
        stream.set_write_timeout(Some(self.connect_timeout))?;

        let (socket, _response) =
            tungstenite::client(request, stream.try_clone()?).map_err(|e| match e {
                HandshakeError::Failure(tungstenite::Error::Io(err))
                    if err.kind() == io::ErrorKind::TimedOut =>
                {
                    LinkError::HandshakeTimeout(self.connect_timeout)
                }
                HandshakeError::Failure(err) => LinkError::WebSocket(err),
                HandshakeError::Interrupted(_) => LinkError::HandshakeTimeout(self.connect_timeout),
            })?;
        stream.set_write_timeout(None)?;

        // Reads give up the lock every poll interval so writes can interleave.
        stream.set_read_timeout(Some(self.poll_interval))?;

        let shared = Arc::new(SharedSocket {
            socket: Mutex::new(socket),
            closed: AtomicBool::new(false),
        });
        Ok(CloudChannel {
            reader: Box::new(SocketReader {
                shared: shared.clone(),
            }),
            writer: Box::new(SocketWriter {
                shared: shared.clone(),
            }),
            closer: Box::new(SocketCloser { shared, stream }),
        })
    }

    fn open_serial(&self) -> LinkResult<SerialChannel> {
        let port = serialport::new(&self.serial_port, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;

        let reader = port.try_clone()?;
        let writer = port.try_clone()?;
        debug!("opened {} at {} baud", self.serial_port, BAUD_RATE);

        Ok(SerialChannel {
            reader: Box::new(reader),
            writer: Box::new(writer),
            closer: Box::new(SerialCloser {
                port: Mutex::new(Some(port)),
            }),
        })
    }
}

/// Try each resolved address in turn, each bounded by `timeout`.
fn connect_any(target: impl ToSocketAddrs, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in target.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
    }))
}

// ============================================================================
// WebSocket
// ============================================================================

struct SharedSocket {
    socket: Mutex<WebSocket<TcpStream>>,
    closed: AtomicBool,
}

struct SocketReader {
    shared: Arc<SharedSocket>,
}

impl MessageReader for SocketReader {
    fn poll_message(&mut self, timeout: Duration) -> LinkResult<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(LinkError::Closed);
            }
            let result = self.shared.socket.lock().read();
            match result {
                Ok(Message::Text(text)) => return Ok(Some(text.into_bytes())),
                Ok(Message::Binary(data)) => return Ok(Some(data)),
                Ok(Message::Close(_)) => return Err(LinkError::Closed),
                Ok(_) => continue,
                Err(tungstenite::Error::Io(ref e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(LinkError::Closed)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

struct SocketWriter {
    shared: Arc<SharedSocket>,
}

impl MessageWriter for SocketWriter {
    fn write_message(&mut self, text: &str) -> LinkResult<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        self.shared
            .socket
            .lock()
            .send(Message::Text(text.to_string()))?;
        Ok(())
    }
}

struct SocketCloser {
    shared: Arc<SharedSocket>,
    stream: TcpStream,
}

impl Closer for SocketCloser {
    fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        // Shutting down the raw stream fails any read in progress.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Holds the original port handle. The reader and writer are clones, so
/// the telemetry pump notices a close through its `reading` flag within one
/// read timeout.
struct SerialCloser {
    port: Mutex<Option<Box<dyn SerialPort>>>,
}

impl Closer for SerialCloser {
    fn close(&self) {
        if let Some(port) = self.port.lock().take() {
            debug!("closing {}", port.name().unwrap_or_default());
        }
    }
}
