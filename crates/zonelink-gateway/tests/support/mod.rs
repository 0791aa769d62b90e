//! In-memory transport for driving the supervisor in tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use zonelink_gateway::{
    CloudChannel, Closer, LinkError, LinkResult, MessageReader, MessageWriter, SerialChannel,
    Transport,
};
use zonelink_protocol::{FrameHeader, CODE_VENT_MODULE_STATE, PREAMBLE};

type CloudSlot = Arc<Mutex<Option<Sender<Vec<u8>>>>>;
type SerialSlot = Arc<Mutex<Option<Sender<Result<Vec<u8>, io::ErrorKind>>>>>;

/// What one dial of the cloud socket does.
#[derive(Debug, Clone)]
pub struct CloudScript {
    /// Reply to the greeting. `None` keeps the socket open but silent.
    pub reply: Option<String>,
    /// Messages delivered after the reply.
    pub inbound: Vec<String>,
}

impl CloudScript {
    pub fn replying(reply: &str) -> Self {
        CloudScript {
            reply: Some(reply.to_string()),
            inbound: Vec::new(),
        }
    }

    /// Accepts the connection and never answers.
    pub fn silent() -> Self {
        CloudScript {
            reply: None,
            inbound: Vec::new(),
        }
    }
}

impl Default for CloudScript {
    fn default() -> Self {
        Self::replying("ok")
    }
}

/// What one open of the serial port does.
#[derive(Debug, Clone, Default)]
pub struct SerialScript {
    /// Bytes the controller sends right away.
    pub bytes: Vec<u8>,
    /// Fail the port once `bytes` have been read.
    pub fail_after: bool,
}

#[derive(Default)]
struct Inner {
    events: Mutex<Vec<String>>,
    cloud_sent: Mutex<Vec<String>>,
    serial_written: Mutex<Vec<Vec<u8>>>,
    cloud_scripts: Mutex<VecDeque<CloudScript>>,
    serial_scripts: Mutex<VecDeque<SerialScript>>,
    dial_failures: AtomicUsize,
    open_failures: AtomicUsize,
    silent_hub: AtomicBool,
    fail_cloud_write: AtomicBool,
    fail_serial_write: AtomicBool,
    dials: AtomicUsize,
    opens: AtomicUsize,
    current_cloud: Mutex<Option<CloudSlot>>,
    current_serial: Mutex<Option<SerialSlot>>,
}

impl Inner {
    fn event(&self, event: String) {
        self.events.lock().push(event);
    }
}

/// Scriptable transport that records every open, close and drop.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_cloud(&self, script: CloudScript) {
        self.inner.cloud_scripts.lock().push_back(script);
    }

    pub fn script_serial(&self, script: SerialScript) {
        self.inner.serial_scripts.lock().push_back(script);
    }

    /// Make the next `n` dials fail.
    pub fn fail_dials(&self, n: usize) {
        self.inner.dial_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` serial opens fail.
    pub fn fail_opens(&self, n: usize) {
        self.inner.open_failures.store(n, Ordering::SeqCst);
    }

    /// Every later dial gets a hub that never acknowledges.
    pub fn silence_hub(&self) {
        self.inner.silent_hub.store(true, Ordering::SeqCst);
    }

    /// The next cloud write fails with a broken pipe.
    pub fn fail_next_cloud_write(&self) {
        self.inner.fail_cloud_write.store(true, Ordering::SeqCst);
    }

    /// The next serial write fails with a broken pipe.
    pub fn fail_next_serial_write(&self) {
        self.inner.fail_serial_write.store(true, Ordering::SeqCst);
    }

    /// Deliver a message on the current cloud socket.
    pub fn push_cloud(&self, message: &str) {
        if let Some(slot) = self.inner.current_cloud.lock().as_ref() {
            if let Some(tx) = slot.lock().as_ref() {
                let _ = tx.send(message.as_bytes().to_vec());
            }
        }
    }

    /// Hub drops the current socket.
    pub fn drop_cloud(&self) {
        if let Some(slot) = self.inner.current_cloud.lock().as_ref() {
            slot.lock().take();
        }
    }

    /// Controller sends bytes on the current port.
    pub fn push_serial(&self, bytes: &[u8]) {
        if let Some(slot) = self.inner.current_serial.lock().as_ref() {
            if let Some(tx) = slot.lock().as_ref() {
                let _ = tx.send(Ok(bytes.to_vec()));
            }
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.events.lock().clone()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// Everything written to the cloud socket, greetings included.
    pub fn cloud_sent(&self) -> Vec<String> {
        self.inner.cloud_sent.lock().clone()
    }

    /// Cloud messages that are not greetings.
    pub fn telemetry_sent(&self) -> Vec<serde_json::Value> {
        self.cloud_sent()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value.get("type_client").is_none())
            .collect()
    }

    pub fn greetings_sent(&self) -> usize {
        self.cloud_sent()
            .iter()
            .filter(|text| text.contains("\"type_client\""))
            .count()
    }

    pub fn serial_written(&self) -> Vec<Vec<u8>> {
        self.inner.serial_written.lock().clone()
    }

    pub fn dials(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Transport for MockTransport {
    fn dial_cloud(&self) -> LinkResult<CloudChannel> {
        if take_failure(&self.inner.dial_failures) {
            self.inner.event("cloud.dial_failed".to_string());
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock hub unreachable",
            )));
        }

        let id = self.inner.dials.fetch_add(1, Ordering::SeqCst) + 1;
        let script = if self.inner.silent_hub.load(Ordering::SeqCst) {
            CloudScript::silent()
        } else {
            self.inner.cloud_scripts.lock().pop_front().unwrap_or_default()
        };

        let (tx, rx) = unbounded();
        if let Some(reply) = script.reply {
            let _ = tx.send(reply.into_bytes());
        }
        for message in script.inbound {
            let _ = tx.send(message.into_bytes());
        }
        let slot: CloudSlot = Arc::new(Mutex::new(Some(tx)));
        *self.inner.current_cloud.lock() = Some(slot.clone());

        let closed = Arc::new(AtomicBool::new(false));
        self.inner.event(format!("cloud.open#{}", id));

        Ok(CloudChannel {
            reader: Box::new(MockCloudReader {
                id,
                rx,
                inner: self.inner.clone(),
            }),
            writer: Box::new(MockCloudWriter {
                closed: closed.clone(),
                inner: self.inner.clone(),
            }),
            closer: Box::new(MockCloser {
                name: format!("cloud.close#{}", id),
                closed,
                release: Box::new(move || {
                    slot.lock().take();
                }),
                inner: self.inner.clone(),
            }),
        })
    }

    fn open_serial(&self) -> LinkResult<SerialChannel> {
        if take_failure(&self.inner.open_failures) {
            self.inner.event("serial.open_failed".to_string());
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "mock port missing",
            )));
        }

        let id = self.inner.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self.inner.serial_scripts.lock().pop_front().unwrap_or_default();

        let (tx, rx) = unbounded();
        if !script.bytes.is_empty() {
            let _ = tx.send(Ok(script.bytes));
        }
        if script.fail_after {
            let _ = tx.send(Err(io::ErrorKind::BrokenPipe));
        }
        let slot: SerialSlot = Arc::new(Mutex::new(Some(tx)));
        *self.inner.current_serial.lock() = Some(slot.clone());

        let closed = Arc::new(AtomicBool::new(false));
        self.inner.event(format!("serial.open#{}", id));

        Ok(SerialChannel {
            reader: Box::new(MockSerialReader {
                id,
                rx,
                buffer: VecDeque::new(),
                inner: self.inner.clone(),
            }),
            writer: Box::new(MockSerialWriter {
                closed: closed.clone(),
                inner: self.inner.clone(),
            }),
            closer: Box::new(MockCloser {
                name: format!("serial.close#{}", id),
                closed,
                release: Box::new(move || {
                    slot.lock().take();
                }),
                inner: self.inner.clone(),
            }),
        })
    }
}

struct MockCloser {
    name: String,
    closed: Arc<AtomicBool>,
    release: Box<dyn Fn() + Send + Sync>,
    inner: Arc<Inner>,
}

impl Closer for MockCloser {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            (self.release)();
            self.inner.event(self.name.clone());
        }
    }
}

struct MockCloudReader {
    id: usize,
    rx: Receiver<Vec<u8>>,
    inner: Arc<Inner>,
}

impl MessageReader for MockCloudReader {
    fn poll_message(&mut self, timeout: Duration) -> LinkResult<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }
}

impl Drop for MockCloudReader {
    fn drop(&mut self) {
        self.inner.event(format!("cloud.reader.drop#{}", self.id));
    }
}

struct MockCloudWriter {
    closed: Arc<AtomicBool>,
    inner: Arc<Inner>,
}

impl MessageWriter for MockCloudWriter {
    fn write_message(&mut self, text: &str) -> LinkResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        if self.inner.fail_cloud_write.swap(false, Ordering::SeqCst) {
            self.inner.event("cloud.write_failed".to_string());
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock hub write failed",
            )));
        }
        self.inner.cloud_sent.lock().push(text.to_string());
        Ok(())
    }
}

struct MockSerialReader {
    id: usize,
    rx: Receiver<Result<Vec<u8>, io::ErrorKind>>,
    buffer: VecDeque<u8>,
    inner: Arc<Inner>,
}

impl Read for MockSerialReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffer.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(10)) {
                Ok(Ok(bytes)) => self.buffer.extend(bytes),
                Ok(Err(kind)) => return Err(io::Error::new(kind, "mock serial failure")),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timeout"))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock port closed"))
                }
            }
        }
        let n = buf.len().min(self.buffer.len());
        for (slot, byte) in buf.iter_mut().zip(self.buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Drop for MockSerialReader {
    fn drop(&mut self) {
        self.inner.event(format!("serial.reader.drop#{}", self.id));
    }
}

struct MockSerialWriter {
    closed: Arc<AtomicBool>,
    inner: Arc<Inner>,
}

impl Write for MockSerialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock port closed"));
        }
        if self.inner.fail_serial_write.swap(false, Ordering::SeqCst) {
            self.inner.event("serial.write_failed".to_string());
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock serial write failed"));
        }
        self.inner.serial_written.lock().push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A code 7 frame for `zone`.
pub fn vent_state_frame(zone: i16, vent_speed: i16) -> Vec<u8> {
    let mut frame = PREAMBLE.to_vec();
    FrameHeader {
        declared_length: 13,
        address: 101,
        command_code: CODE_VENT_MODULE_STATE,
    }
    .write_to(&mut frame);
    frame.extend_from_slice(&zone.to_le_bytes());
    frame.extend_from_slice(&vent_speed.to_le_bytes());
    frame.extend_from_slice(&[1, 2, 3, 4]);
    frame
}
