//! Packet codec for encoding/decoding wire primitives
//!
//! Pure translation between values and bytes; no I/O. Writers build a
//! payload into a scratch buffer, readers are a cursor over a received
//! payload slice.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use uuid::Uuid;

use super::MAX_PAYLOAD_LEN;

/// Wire format errors
#[derive(Error, Debug)]
pub enum WireError {
    #[error("truncated packet: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("non-ASCII byte in ASCII string field")]
    InvalidAscii,

    #[error("payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),
}

pub type WireResult<T> = Result<T, WireError>;

/// Builds a payload by writing primitive fields in sequence.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    /// Write a UTF-8 string with a 4-byte length prefix.
    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.buf.put_u32(bytes.len() as u32);
        self.buf.put_slice(bytes);
    }

    /// Write an ASCII string with a 2-byte length prefix.
    ///
    /// Legacy fields only; fails on non-ASCII input rather than mangling it.
    pub fn write_ascii_string(&mut self, value: &str) -> WireResult<()> {
        if !value.is_ascii() {
            return Err(WireError::InvalidAscii);
        }
        let bytes = value.as_bytes();
        self.buf.put_u16(bytes.len() as u16);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Write a 128-bit identifier as two u64 halves, high then low.
    pub fn write_id128(&mut self, id: Uuid) {
        let (high, low) = id.as_u64_pair();
        self.buf.put_u64(high);
        self.buf.put_u64(low);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Encode a complete packet: `[opcode][length: u16 BE][payload]`.
///
/// The payload is built into a scratch writer first so the length is known
/// before the header is emitted.
pub fn encode_packet(opcode: u8, build: impl FnOnce(&mut PacketWriter)) -> WireResult<Bytes> {
    let mut payload = PacketWriter::new();
    build(&mut payload);

    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(WireError::PayloadTooLarge(payload.len(), MAX_PAYLOAD_LEN));
    }

    let mut buf = BytesMut::with_capacity(super::HEADER_LEN + payload.len());
    buf.put_u8(opcode);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload.as_slice());
    Ok(buf.freeze())
}

/// Sequential reader over a payload slice.
///
/// Each `read_*` consumes from the cursor; reading past the end fails with
/// [`WireError::Truncated`] rather than truncating silently.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> WireResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i32(&mut self) -> WireResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> WireResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a UTF-8 string with a 4-byte length prefix.
    pub fn read_string(&mut self) -> WireResult<String> {
        let length = self.read_u32()? as usize;
        let bytes = self.take(length)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8)
    }

    /// Read an ASCII string with a 2-byte length prefix.
    pub fn read_ascii_string(&mut self) -> WireResult<String> {
        let length = self.read_u16()? as usize;
        let bytes = self.take(length)?;
        if !bytes.is_ascii() {
            return Err(WireError::InvalidAscii);
        }
        // ASCII is valid UTF-8
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a 128-bit identifier written as two u64 halves, high then low.
    pub fn read_id128(&mut self) -> WireResult<Uuid> {
        let high = self.read_u64()?;
        let low = self.read_u64()?;
        Ok(Uuid::from_u64_pair(high, low))
    }
}
