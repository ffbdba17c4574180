//! Network module - self-healing TCP connection to the management server
//!
//! Provides:
//! - Connection manager that dials, reads, and reconnects on loss
//! - Outbound frame queue with drop-when-disconnected semantics
//! - Connection state and event reporting for the session layer

mod manager;

pub use manager::*;

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::{Packet, CONNECT_TIMEOUT, RECONNECT_DELAY};

/// Network errors
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection manager already running")]
    AlreadyRunning,
}

pub type NetResult<T> = Result<T, NetError>;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to be
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Link established, traffic flowing
    Connected,
    /// Waiting out the delay before the next attempt
    Reconnecting,
    /// A failure was observed; transitions to Reconnecting
    Error,
}

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Successfully connected to the server
    Connected { server_addr: SocketAddr },
    /// Connection lost or shut down
    Disconnected { reason: String },
    /// A complete packet arrived from the server
    PacketReceived { packet: Packet },
    /// Connection error
    Error { message: String },
}

/// Tunables for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Server hostname or IP address
    pub host: String,
    /// Server port
    pub port: u16,
    /// How long a single dial may take before it counts as failed
    pub connect_timeout: Duration,
    /// Pause between a lost connection and the next attempt
    pub reconnect_delay: Duration,
}

impl ConnectorOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
