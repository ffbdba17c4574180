//! Stream framing - reassembles complete packets from raw TCP reads
//!
//! TCP delivers an arbitrary byte stream; one read may carry a fraction of
//! a packet or several packets back to back. [`PacketBuffer`] accumulates
//! reads and yields complete packets as they become available.

use bytes::{Buf, Bytes, BytesMut};

use super::HEADER_LEN;

/// A complete framed packet: opcode plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(opcode: u8, payload: Bytes) -> Self {
        Self { opcode, payload }
    }

    /// Total encoded size including the 3-byte header.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Accumulates raw reads and extracts complete packets.
///
/// A packet is complete only once `3 + length` contiguous bytes are
/// buffered. Call [`try_extract`](Self::try_extract) in a loop after every
/// [`append`](Self::append) until it returns `None` - a single read may
/// contain multiple packets.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buf: BytesMut,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Append incoming bytes to the buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract one complete packet if enough bytes are buffered.
    pub fn try_extract(&mut self) -> Option<Packet> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let length = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
        let total = HEADER_LEN + length;
        if self.buf.len() < total {
            return None;
        }

        let opcode = self.buf[0];
        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(length).freeze();
        Some(Packet::new(opcode, payload))
    }

    /// Discard any buffered partial data.
    ///
    /// Invoked on reconnect so a fresh connection's bytes are never
    /// stitched onto a stale partial packet.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered (complete or partial).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_packet, opcode};

    fn sample_packets() -> Vec<Bytes> {
        vec![
            encode_packet(opcode::HEARTBEAT, |_| {}).unwrap(),
            encode_packet(opcode::DEVICE_CONNECTED, |w| {
                w.write_string("1.0");
                w.write_string("Quest");
                w.write_string("ABC123");
            })
            .unwrap(),
            encode_packet(opcode::DISPLAY_MESSAGE, |w| {
                w.write_string("hello from the server");
            })
            .unwrap(),
        ]
    }

    #[test]
    fn test_extract_single_packet() {
        let mut buffer = PacketBuffer::new();
        buffer.append(&encode_packet(opcode::HEARTBEAT, |_| {}).unwrap());

        let packet = buffer.try_extract().unwrap();
        assert_eq!(packet.opcode, opcode::HEARTBEAT);
        assert!(packet.payload.is_empty());
        assert!(buffer.try_extract().is_none());
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn test_incomplete_header_yields_nothing() {
        let mut buffer = PacketBuffer::new();
        buffer.append(&[0x02]);
        assert!(buffer.try_extract().is_none());
        buffer.append(&[0x00]);
        assert!(buffer.try_extract().is_none());
        buffer.append(&[0x00]);
        assert!(buffer.try_extract().is_some());
    }

    #[test]
    fn test_incomplete_payload_yields_nothing() {
        let mut buffer = PacketBuffer::new();
        // Header declares 5 payload bytes, only 4 arrive
        buffer.append(&[0x50, 0x00, 0x05, 1, 2, 3, 4]);
        assert!(buffer.try_extract().is_none());

        buffer.append(&[5]);
        let packet = buffer.try_extract().unwrap();
        assert_eq!(packet.payload.as_ref(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_multiple_packets_in_one_append() {
        let packets = sample_packets();
        let mut stream = Vec::new();
        for p in &packets {
            stream.extend_from_slice(p);
        }

        let mut buffer = PacketBuffer::new();
        buffer.append(&stream);

        let mut extracted = Vec::new();
        while let Some(packet) = buffer.try_extract() {
            extracted.push(packet);
        }

        assert_eq!(extracted.len(), packets.len());
        for (packet, original) in extracted.iter().zip(&packets) {
            assert_eq!(packet.opcode, original[0]);
            assert_eq!(packet.payload.as_ref(), &original[HEADER_LEN..]);
        }
    }

    #[test]
    fn test_byte_at_a_time_feeding() {
        let packets = sample_packets();
        let mut stream = Vec::new();
        for p in &packets {
            stream.extend_from_slice(p);
        }

        let mut buffer = PacketBuffer::new();
        let mut extracted = Vec::new();
        for byte in stream {
            buffer.append(&[byte]);
            while let Some(packet) = buffer.try_extract() {
                extracted.push(packet);
            }
        }

        assert_eq!(extracted.len(), packets.len());
        for (packet, original) in extracted.iter().zip(&packets) {
            assert_eq!(packet.encoded_len(), original.len());
            assert_eq!(packet.payload.as_ref(), &original[HEADER_LEN..]);
        }
    }

    #[test]
    fn test_arbitrary_chunk_sizes() {
        let packets = sample_packets();
        let mut stream = Vec::new();
        for p in &packets {
            stream.extend_from_slice(p);
        }

        for chunk_size in [2, 3, 7, 16] {
            let mut buffer = PacketBuffer::new();
            let mut count = 0;
            for chunk in stream.chunks(chunk_size) {
                buffer.append(chunk);
                while buffer.try_extract().is_some() {
                    count += 1;
                }
            }
            assert_eq!(count, packets.len(), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_clear_discards_partial_data() {
        let mut buffer = PacketBuffer::new();
        buffer.append(&[0x50, 0x00, 0x05, 1, 2]);
        buffer.clear();
        assert_eq!(buffer.buffered(), 0);

        // A fresh packet extracts cleanly after the reset
        buffer.append(&encode_packet(opcode::HEARTBEAT, |_| {}).unwrap());
        let packet = buffer.try_extract().unwrap();
        assert_eq!(packet.opcode, opcode::HEARTBEAT);
    }
}
