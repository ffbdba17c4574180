//! Session module - protocol behavior on top of the managed connection
//!
//! The session consumes connection events, introduces the device after
//! every (re)connect, beats the heart while connected, and routes incoming
//! packets through the handler registry. Handlers talk back through a
//! [`SessionHandle`], which is also where restart and shutdown of the whole
//! agent are requested.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::device::DeviceControl;
use crate::handlers::HandlerRegistry;
use crate::network::{ConnectionEvent, ConnectionManager};
use crate::protocol::{encode_packet, opcode, PacketWriter, CLIENT_VERSION, HEARTBEAT_INTERVAL};

/// Why the session ended; also the control requests handlers can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Rebuild with fresh configuration and run again
    Restart,
    /// Stop the agent
    Shutdown,
}

/// Cloneable handle for sending packets and controlling the session.
#[derive(Clone)]
pub struct SessionHandle {
    outbound_tx: mpsc::Sender<Bytes>,
    control_tx: mpsc::Sender<SessionExit>,
}

impl SessionHandle {
    /// Encode and queue a packet. Returns false if it could not be queued;
    /// the frame is dropped in that case.
    pub async fn send_packet(
        &self,
        op: u8,
        build: impl FnOnce(&mut PacketWriter),
    ) -> bool {
        let frame = match encode_packet(op, build) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode {}: {}", opcode::name(op), e);
                return false;
            }
        };

        match self.outbound_tx.send(frame).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Session closed, dropping {}", opcode::name(op));
                false
            }
        }
    }

    /// Report an error condition to the server.
    pub async fn send_error(&self, message: &str) -> bool {
        tracing::warn!("Reporting error to server: {}", message);
        self.send_packet(opcode::ERROR, |w| w.write_string(message))
            .await
    }

    /// Tell the server which app came to the foreground.
    pub async fn foreground_app_changed(&self, package: &str, app_name: &str) -> bool {
        self.send_packet(opcode::FOREGROUND_APP_CHANGED, |w| {
            w.write_string(package);
            w.write_string(app_name);
        })
        .await
    }

    /// Ask the agent to tear down and rebuild the session.
    pub async fn request_restart(&self) {
        let _ = self.control_tx.send(SessionExit::Restart).await;
    }

    /// Ask the agent to stop.
    pub async fn request_shutdown(&self) {
        let _ = self.control_tx.send(SessionExit::Shutdown).await;
    }

    /// Handle whose traffic lands in plain channels, for handler tests.
    #[cfg(test)]
    pub fn test_pair(
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>, mpsc::Receiver<SessionExit>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::channel(capacity);
        (
            Self {
                outbound_tx,
                control_tx,
            },
            outbound_rx,
            control_rx,
        )
    }
}

/// Protocol session driving one connection manager.
pub struct ProtocolSession {
    manager: Arc<ConnectionManager>,
    events: mpsc::Receiver<ConnectionEvent>,
    registry: HandlerRegistry,
    device: Arc<dyn DeviceControl>,
    handle: SessionHandle,
    outbound_rx: mpsc::Receiver<Bytes>,
    control_rx: mpsc::Receiver<SessionExit>,
    heartbeat_interval: Duration,
}

impl ProtocolSession {
    pub fn new(
        manager: Arc<ConnectionManager>,
        events: mpsc::Receiver<ConnectionEvent>,
        registry: HandlerRegistry,
        device: Arc<dyn DeviceControl>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (control_tx, control_rx) = mpsc::channel(8);

        Self {
            manager,
            events,
            registry,
            device,
            handle: SessionHandle {
                outbound_tx,
                control_tx,
            },
            outbound_rx,
            control_rx,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Handle for sending packets and control requests into this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run until a restart or shutdown is requested. Starts the connection
    /// manager on entry and stops it before returning.
    pub async fn run(mut self) -> SessionExit {
        if let Err(e) = self.manager.start().await {
            tracing::error!("Failed to start connection manager: {}", e);
            return SessionExit::Shutdown;
        }

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        let mut connected = false;

        let exit = loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(ConnectionEvent::Connected { server_addr }) => {
                            tracing::info!("Session established with {}", server_addr);
                            connected = true;
                            heartbeat.reset();
                            self.send_identification().await;
                        }
                        Some(ConnectionEvent::Disconnected { reason }) => {
                            tracing::info!("Session lost: {}", reason);
                            connected = false;
                        }
                        Some(ConnectionEvent::PacketReceived { packet }) => {
                            self.registry.dispatch(&packet, &self.handle).await;
                        }
                        Some(ConnectionEvent::Error { message }) => {
                            tracing::debug!("Connection error: {}", message);
                            // Best-effort diagnostic; reaches the server only
                            // if a connection is up again by now
                            if self.manager.is_connected().await {
                                if let Ok(frame) =
                                    encode_packet(opcode::ERROR, |w| w.write_string(&message))
                                {
                                    self.manager.send(frame).await;
                                }
                            }
                        }
                        None => break SessionExit::Shutdown,
                    }
                }

                Some(frame) = self.outbound_rx.recv() => {
                    self.manager.send(frame).await;
                }

                _ = heartbeat.tick() => {
                    if connected {
                        self.send_heartbeat().await;
                    }
                }

                control = self.control_rx.recv() => {
                    match control {
                        Some(exit) => break exit,
                        None => break SessionExit::Shutdown,
                    }
                }
            }
        };

        tracing::info!("Session ending: {:?}", exit);
        // Unblock any event sends still pending in the loop before
        // waiting for it to exit
        drop(self.events);
        self.manager.stop().await;
        exit
    }

    /// Introduce this device: version, model, serial.
    async fn send_identification(&self) {
        let info = self.device.info();
        let sent = self
            .handle
            .send_packet(opcode::DEVICE_CONNECTED, |w| {
                w.write_string(CLIENT_VERSION);
                w.write_string(&info.model);
                w.write_string(&info.serial);
            })
            .await;

        if sent {
            tracing::info!("Identified as {} ({})", info.model, info.serial);
        } else {
            tracing::warn!("Failed to queue identification packet");
        }
    }

    async fn send_heartbeat(&self) {
        if self.handle.send_packet(opcode::HEARTBEAT, |_| {}).await {
            tracing::debug!("Heartbeat sent");
        }
    }
}
