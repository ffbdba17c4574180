//! Protocol module - Defines the wire protocol for agent/server communication
//!
//! The protocol uses a simple binary format:
//! - 1 byte opcode
//! - 2 bytes payload length (big-endian)
//! - Variable length payload
//!
//! All multi-byte integers are big-endian. Strings are UTF-8 with a 4-byte
//! length prefix; a u16-prefixed ASCII form exists for legacy fields.

pub mod opcode;

mod framing;
mod wire;

pub use framing::{Packet, PacketBuffer};
pub use wire::{encode_packet, PacketReader, PacketWriter, WireError, WireResult};

use std::time::Duration;

/// Client version sent in the identification packet
pub const CLIENT_VERSION: &str = "1.0";

/// Header size: opcode(1) + length(2) = 3 bytes
pub const HEADER_LEN: usize = 3;

/// Maximum payload size (limited by the u16 length field)
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Default port of the control server
pub const DEFAULT_PORT: u16 = 8888;

/// Delay between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Interval between heartbeat packets while connected
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Timeout for a single connect attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
