//! Connection manager
//!
//! Owns the TCP link to the management server. A background task dials,
//! reads, and reconnects after a fixed delay whenever the link drops, so
//! callers never deal with connection lifetime themselves. Outbound frames
//! are queued per connection and silently dropped while disconnected.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use super::{
    resolve_host, ConnectionEvent, ConnectionState, ConnectorOptions, NetError, NetResult,
};
use crate::protocol::{opcode, PacketBuffer};

const OUTBOUND_QUEUE_DEPTH: usize = 256;
const READ_BUFFER_LEN: usize = 4096;

/// State observed atomically by `send` and the state getters.
struct Shared {
    state: ConnectionState,
    writer: Option<mpsc::Sender<Bytes>>,
}

/// Self-healing connection to the management server.
pub struct ConnectionManager {
    /// Connection tunables
    options: ConnectorOptions,
    /// Current state and per-connection writer queue
    shared: Arc<RwLock<Shared>>,
    /// Event sender
    event_tx: mpsc::Sender<ConnectionEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<ConnectionEvent>>,
    /// Shutdown signal
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
    /// Background loop handle, awaited by `stop`
    task: Arc<RwLock<Option<JoinHandle<()>>>>,
    /// Whether the background loop should keep retrying
    running: Arc<AtomicBool>,
}

impl ConnectionManager {
    /// Create a new manager; call [`start`](Self::start) to begin dialing.
    pub fn new(options: ConnectorOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);

        Self {
            options,
            shared: Arc::new(RwLock::new(Shared {
                state: ConnectionState::Disconnected,
                writer: None,
            })),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: Arc::new(RwLock::new(None)),
            task: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.event_rx.take()
    }

    /// Spawn the background connection loop.
    pub async fn start(&self) -> NetResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NetError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        {
            let mut st = self.shutdown_tx.write().await;
            *st = Some(shutdown_tx);
        }

        let options = self.options.clone();
        let shared = self.shared.clone();
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();

        let task = tokio::spawn(connection_loop(options, shared, event_tx, running, shutdown_rx));
        *self.task.write().await = Some(task);

        Ok(())
    }

    /// Stop the loop. Closes the current connection, halts reconnection,
    /// and returns once the background loop has exited.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(tx) = &*self.shutdown_tx.read().await {
            let _ = tx.try_send(());
        }

        if let Some(task) = self.task.write().await.take() {
            let _ = task.await;
        }
    }

    /// Queue an encoded frame for transmission.
    ///
    /// Never blocks. Returns `false` and drops the frame when disconnected
    /// or when the outbound queue is full.
    pub async fn send(&self, frame: Bytes) -> bool {
        let guard = self.shared.read().await;

        let writer = match (guard.state, &guard.writer) {
            (ConnectionState::Connected, Some(writer)) => writer,
            _ => {
                tracing::warn!("Not connected, dropping {} byte frame", frame.len());
                return false;
            }
        };

        match writer.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Connection closing, dropping frame");
                false
            }
        }
    }

    /// Get the current state
    pub async fn state(&self) -> ConnectionState {
        self.shared.read().await.state
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }
}

/// Why a connection ended.
enum Teardown {
    /// Server closed the stream cleanly
    Closed,
    /// Read or write failure
    Error(String),
    /// Local stop request
    Shutdown,
}

async fn set_state(shared: &Arc<RwLock<Shared>>, state: ConnectionState) {
    shared.write().await.state = state;
}

/// Dial, serve one connection, tear down, wait, repeat.
async fn connection_loop(
    options: ConnectorOptions,
    shared: Arc<RwLock<Shared>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    running: Arc<AtomicBool>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut framing = PacketBuffer::new();

    while running.load(Ordering::SeqCst) {
        set_state(&shared, ConnectionState::Connecting).await;
        tracing::info!("Connecting to {}:{}", options.host, options.port);

        // A stop request must not wait out an in-flight dial
        let attempt = tokio::select! {
            result = establish(&options) => result,
            _ = shutdown_rx.recv() => break,
        };

        match attempt {
            Ok((stream, server_addr)) => {
                // A fresh connection must never inherit stale partial bytes
                framing.clear();

                let teardown = run_connection(
                    stream,
                    server_addr,
                    &shared,
                    &event_tx,
                    &mut framing,
                    &mut shutdown_rx,
                )
                .await;

                {
                    let mut guard = shared.write().await;
                    guard.writer = None;
                }

                match teardown {
                    Teardown::Shutdown => {
                        set_state(&shared, ConnectionState::Disconnected).await;
                        let _ = event_tx
                            .send(ConnectionEvent::Disconnected {
                                reason: "shutdown requested".to_string(),
                            })
                            .await;
                        break;
                    }
                    Teardown::Closed => {
                        tracing::info!("Server closed the connection");
                        let _ = event_tx
                            .send(ConnectionEvent::Disconnected {
                                reason: "connection closed by server".to_string(),
                            })
                            .await;
                    }
                    Teardown::Error(message) => {
                        tracing::warn!("Connection lost: {}", message);
                        set_state(&shared, ConnectionState::Error).await;
                        let _ = event_tx
                            .send(ConnectionEvent::Error {
                                message: message.clone(),
                            })
                            .await;
                        let _ = event_tx
                            .send(ConnectionEvent::Disconnected { reason: message })
                            .await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Connect attempt failed: {}", e);
                set_state(&shared, ConnectionState::Error).await;
                let _ = event_tx
                    .send(ConnectionEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }

        set_state(&shared, ConnectionState::Reconnecting).await;
        tracing::info!("Reconnecting in {:?}", options.reconnect_delay);

        tokio::select! {
            _ = tokio::time::sleep(options.reconnect_delay) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    set_state(&shared, ConnectionState::Disconnected).await;
    tracing::debug!("Connection loop ended");
}

/// Resolve and dial with a timeout.
async fn establish(options: &ConnectorOptions) -> NetResult<(TcpStream, SocketAddr)> {
    let addr = resolve_host(&options.host, options.port).await?;

    match tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok((stream, addr)),
        Ok(Err(e)) => Err(NetError::Io(e)),
        Err(_) => Err(NetError::Timeout),
    }
}

/// Serve one established connection until it ends.
async fn run_connection(
    stream: TcpStream,
    server_addr: SocketAddr,
    shared: &Arc<RwLock<Shared>>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    framing: &mut PacketBuffer,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Teardown {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let (writer_tx, mut writer_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_DEPTH);

    {
        let mut guard = shared.write().await;
        guard.writer = Some(writer_tx);
        guard.state = ConnectionState::Connected;
    }

    tracing::info!("Connected to {}", server_addr);
    let _ = event_tx
        .send(ConnectionEvent::Connected { server_addr })
        .await;

    let mut read_buf = [0u8; READ_BUFFER_LEN];

    loop {
        tokio::select! {
            // Bytes from the server
            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => return Teardown::Closed,
                    Ok(n) => {
                        framing.append(&read_buf[..n]);
                        while let Some(packet) = framing.try_extract() {
                            tracing::debug!(
                                "Received {} ({} byte payload)",
                                opcode::name(packet.opcode),
                                packet.payload.len(),
                            );
                            let _ = event_tx
                                .send(ConnectionEvent::PacketReceived { packet })
                                .await;
                        }
                    }
                    Err(e) => return Teardown::Error(format!("Read error: {}", e)),
                }
            }

            // Queued outbound frames
            Some(frame) = writer_rx.recv() => {
                if let Err(e) = writer.write_all(&frame).await {
                    return Teardown::Error(format!("Write error: {}", e));
                }
            }

            // Stop request
            _ = shutdown_rx.recv() => return Teardown::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_packet;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn recv_event(events: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn wait_for_connected(events: &mut mpsc::Receiver<ConnectionEvent>) -> SocketAddr {
        loop {
            if let ConnectionEvent::Connected { server_addr } = recv_event(events).await {
                return server_addr;
            }
        }
    }

    async fn wait_for_disconnected(events: &mut mpsc::Receiver<ConnectionEvent>) -> String {
        loop {
            if let ConnectionEvent::Disconnected { reason } = recv_event(events).await {
                return reason;
            }
        }
    }

    fn test_options(port: u16) -> ConnectorOptions {
        ConnectorOptions::new("127.0.0.1", port)
            .with_connect_timeout(Duration::from_secs(1))
            .with_reconnect_delay(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_manager_starts_disconnected() {
        let manager = ConnectionManager::new(test_options(1));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_drops_frame() {
        let manager = ConnectionManager::new(test_options(1));
        let frame = Bytes::from_static(&[opcode::HEARTBEAT, 0x00, 0x00]);
        assert!(!manager.send(frame).await);
    }

    #[tokio::test]
    async fn test_connect_and_receive_packet() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut manager = ConnectionManager::new(test_options(port));
        let mut events = manager.take_event_receiver().unwrap();
        manager.start().await.unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        wait_for_connected(&mut events).await;
        assert!(manager.is_connected().await);

        server
            .write_all(&[opcode::HEARTBEAT, 0x00, 0x00])
            .await
            .unwrap();

        match recv_event(&mut events).await {
            ConnectionEvent::PacketReceived { packet } => {
                assert_eq!(packet.opcode, opcode::HEARTBEAT);
                assert!(packet.payload.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_send_reaches_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut manager = ConnectionManager::new(test_options(port));
        let mut events = manager.take_event_receiver().unwrap();
        manager.start().await.unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        wait_for_connected(&mut events).await;

        let frame = encode_packet(opcode::PING_RESPONSE, |w| {
            w.write_string("pong");
        })
        .unwrap();

        assert!(manager.send(frame.clone()).await);

        let mut received = vec![0u8; frame.len()];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame.as_ref());

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_fragmented_packet_is_reassembled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut manager = ConnectionManager::new(test_options(port));
        let mut events = manager.take_event_receiver().unwrap();
        manager.start().await.unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        wait_for_connected(&mut events).await;

        // Header split across two writes
        server.write_all(&[opcode::HEARTBEAT]).await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.write_all(&[0x00, 0x00]).await.unwrap();

        match recv_event(&mut events).await {
            ConnectionEvent::PacketReceived { packet } => {
                assert_eq!(packet.opcode, opcode::HEARTBEAT);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut manager = ConnectionManager::new(test_options(port));
        let mut events = manager.take_event_receiver().unwrap();
        manager.start().await.unwrap();

        let (server, _) = listener.accept().await.unwrap();
        wait_for_connected(&mut events).await;

        drop(server);
        wait_for_disconnected(&mut events).await;

        // The manager dials again after the delay
        let (accepted, _) = tokio::join!(listener.accept(), wait_for_connected(&mut events));
        accepted.unwrap();
        assert!(manager.is_connected().await);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_connect_failure_retries_until_server_appears() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut manager = ConnectionManager::new(test_options(addr.port()));
        let mut events = manager.take_event_receiver().unwrap();
        manager.start().await.unwrap();

        // Nothing listening yet
        match recv_event(&mut events).await {
            ConnectionEvent::Error { .. } => {}
            other => panic!("unexpected event: {:?}", other),
        }

        let listener = TcpListener::bind(addr).await.unwrap();
        let (accepted, _) = tokio::join!(listener.accept(), wait_for_connected(&mut events));
        accepted.unwrap();

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_stop_halts_reconnection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut manager = ConnectionManager::new(test_options(port));
        let mut events = manager.take_event_receiver().unwrap();
        manager.start().await.unwrap();

        let (_server, _) = listener.accept().await.unwrap();
        wait_for_connected(&mut events).await;

        manager.stop().await;
        let reason = wait_for_disconnected(&mut events).await;
        assert_eq!(reason, "shutdown requested");
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        // No further dial attempts arrive after stop
        let redial = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(redial.is_err());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let manager = ConnectionManager::new(test_options(port));
        manager.start().await.unwrap();
        assert!(matches!(
            manager.start().await,
            Err(NetError::AlreadyRunning)
        ));

        manager.stop().await;
    }
}
