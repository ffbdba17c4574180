//! FleetLink - Remote device management agent
//!
//! A persistent client that holds a TCP connection to a control server,
//! accepts binary commands, executes device operations, and reports
//! results and status.
//!
//! The crate is split into the protocol engine (packet codec, stream
//! framing, connection manager, dispatcher, session) and a set of command
//! handlers that run against an injected [`device::DeviceControl`]
//! backend. Integrators can register their own handlers and backends; the
//! `fleetlink` binary wires in the [`device::HostDevice`] backend for
//! ordinary hosts.

pub mod config;
pub mod device;
pub mod handlers;
pub mod network;
pub mod protocol;
pub mod session;

pub use device::{DeviceControl, DeviceInfo, HostDevice};
pub use handlers::{HandlerRegistry, PacketHandler};
pub use network::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectorOptions};
pub use protocol::{Packet, PacketBuffer, PacketReader, PacketWriter};
pub use session::{ProtocolSession, SessionExit, SessionHandle};
