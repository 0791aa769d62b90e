//! Frame synchronization and header handling.
//!
//! The controller streams frames back to back with no length prefix the host
//! can trust, so every frame is located by scanning for the preamble:
//!
//! ```text
//! +------+------+------+------+--------+---------+------+---------
//! | 0x55 | 0xAA | 0x55 | 0xAA | len    | address | code | payload
//! |      |      |      |      | i16 LE | i32 LE  | u8   | ...
//! +------+------+------+------+--------+---------+------+---------
//! ```

use std::io::{self, Read};

use bytes::BufMut;

use crate::constants::*;
use crate::telemetry::{decode_body, InboundFrame};

/// Byte-at-a-time matcher for the 4-byte preamble.
///
/// Progress counts the preamble bytes matched so far. A `0x55` never drops
/// progress back to zero: at positions where it is not the expected byte it
/// is taken as the first byte of a new preamble.
#[derive(Debug, Default, Clone)]
pub struct PreambleScanner {
    progress: u8,
}

impl PreambleScanner {
    /// Create a scanner with no progress.
    pub const fn new() -> Self {
        PreambleScanner { progress: 0 }
    }

    /// Feed one byte. Returns `true` when this byte completes a preamble,
    /// after which progress starts again from zero.
    pub fn push(&mut self, byte: u8) -> bool {
        self.progress = match (self.progress, byte) {
            (2, PREAMBLE_LOW) => 3,
            (3, PREAMBLE_HIGH) => {
                self.progress = 0;
                return true;
            }
            (1, PREAMBLE_HIGH) => 2,
            (_, PREAMBLE_LOW) => 1,
            _ => 0,
        };
        false
    }

    /// Number of preamble bytes matched so far (0..=3).
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Drop any partial match.
    pub fn reset(&mut self) {
        self.progress = 0;
    }
}

/// Header that follows the preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared frame length. Positional only, never checked.
    pub declared_length: i16,
    /// Station address.
    pub address: i32,
    /// Selects the payload layout.
    pub command_code: u8,
}

impl FrameHeader {
    /// Encoded size: length + address + command code.
    pub const WIRE_LEN: usize = 2 + HEADER_LEN;

    /// Append the little-endian header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_i16_le(self.declared_length);
        buf.put_i32_le(self.address);
        buf.put_u8(self.command_code);
    }

    /// Parse a header from the start of `data`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_LEN {
            return None;
        }
        Some(FrameHeader {
            declared_length: i16::from_le_bytes([data[0], data[1]]),
            address: i32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            command_code: data[6],
        })
    }

    pub(crate) fn read_from<R: Read>(src: &mut FieldReader<R>) -> io::Result<Self> {
        let declared_length = src.read_i16()?;
        let address = src.read_i32()?;
        let command_code = src.read_u8()?;
        Ok(FrameHeader {
            declared_length,
            address,
            command_code,
        })
    }
}

/// Sequential little-endian field reads over a byte source.
///
/// Counts the bytes consumed since the last [`FieldReader::mark`].
#[derive(Debug)]
pub(crate) struct FieldReader<R> {
    inner: R,
    consumed: usize,
}

impl<R: Read> FieldReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        FieldReader { inner, consumed: 0 }
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        self.consumed += N;
        Ok(buf)
    }

    pub(crate) fn mark(&mut self) {
        self.consumed = 0;
    }

    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }

    pub(crate) fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_i16(&mut self) -> io::Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }
}

/// Reads telemetry frames from a serial byte source.
///
/// The scanner state lives as long as the reader, so a reader should be
/// created per connection and dropped with it.
#[derive(Debug)]
pub struct FrameReader<R> {
    source: FieldReader<R>,
    scanner: PreambleScanner,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a byte source.
    pub fn new(source: R) -> Self {
        FrameReader {
            source: FieldReader::new(source),
            scanner: PreambleScanner::new(),
        }
    }

    /// Consume bytes until a full preamble has been seen.
    ///
    /// Blocks for as long as the source does; noise between frames is
    /// discarded silently.
    pub fn sync(&mut self) -> io::Result<()> {
        let mut skipped = 0usize;
        loop {
            let byte = self.source.read_u8()?;
            if self.scanner.push(byte) {
                if skipped > 0 {
                    log::trace!("discarded {} bytes before preamble", skipped);
                }
                return Ok(());
            }
            if self.scanner.progress() == 0 {
                skipped += 1;
            }
        }
    }

    /// Synchronize, then read the header and the payload for its command code.
    ///
    /// Any error comes from the byte source.
    pub fn next_frame(&mut self) -> io::Result<InboundFrame> {
        self.sync()?;
        let header = FrameHeader::read_from(&mut self.source)?;
        decode_body(header, &mut self.source)
    }

    /// Current preamble progress.
    pub fn scanner(&self) -> &PreambleScanner {
        &self.scanner
    }

    /// Unwrap the byte source.
    pub fn into_inner(self) -> R {
        self.source.inner
    }
}
