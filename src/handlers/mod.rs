//! Handlers module - maps server commands to device operations
//!
//! One handler per command opcode, registered explicitly in
//! [`register_defaults`]. Dispatch looks up the opcode, hands the payload
//! reader to the handler, and contains any failure so one bad packet never
//! takes the session down.

pub mod apps;
pub mod install;
pub mod shell;
pub mod status;
pub mod system;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ConfigError, ConfigStore};
use crate::device::{DeviceControl, DeviceError};
use crate::protocol::{opcode, Packet, PacketReader, WireError};
use crate::session::SessionHandle;

/// Errors a handler can surface to the dispatcher
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Malformed payload: {0}")]
    Payload(#[from] WireError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// One server command
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// Opcode this handler consumes
    fn opcode(&self) -> u8;

    /// Handle one packet; the reader is positioned at the payload start
    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()>;
}

/// Routes incoming packets to their registered handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u8, Box<dyn PacketHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. The first registration for an opcode wins.
    pub fn register(&mut self, handler: Box<dyn PacketHandler>) {
        let op = handler.opcode();
        match self.handlers.entry(op) {
            Entry::Occupied(_) => {
                tracing::warn!(
                    "Handler already registered for {}, keeping the first",
                    opcode::name(op)
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
            }
        }
    }

    pub fn contains(&self, op: u8) -> bool {
        self.handlers.contains_key(&op)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route one packet. Unknown opcodes and handler failures are logged
    /// and dropped; they never propagate.
    pub async fn dispatch(&self, packet: &Packet, session: &SessionHandle) {
        match self.handlers.get(&packet.opcode) {
            Some(handler) => {
                let mut reader = PacketReader::new(&packet.payload);
                if let Err(e) = handler.handle(&mut reader, session).await {
                    tracing::error!("{} handler failed: {}", opcode::name(packet.opcode), e);
                }
            }
            None => {
                tracing::warn!(
                    "No handler for {} (0x{:02X}), dropping packet",
                    opcode::name(packet.opcode),
                    packet.opcode
                );
            }
        }
    }
}

/// Register the full built-in command suite.
///
/// This list is the single source of truth for which commands the agent
/// answers; there is no implicit discovery.
pub fn register_defaults(
    registry: &mut HandlerRegistry,
    device: Arc<dyn DeviceControl>,
    config: ConfigStore,
) {
    registry.register(Box::new(status::RequestBatteryHandler::new(device.clone())));
    registry.register(Box::new(status::GetVolumeHandler::new(device.clone())));
    registry.register(Box::new(status::SetVolumeHandler::new(device.clone())));
    registry.register(Box::new(status::PingHandler::new(device.clone())));

    registry.register(Box::new(apps::LaunchAppHandler::new(device.clone())));
    registry.register(Box::new(apps::RequestInstalledAppsHandler::new(
        device.clone(),
    )));
    registry.register(Box::new(apps::UninstallAppHandler::new(device.clone())));
    registry.register(Box::new(apps::CloseAllAppsHandler::new(device.clone())));

    registry.register(Box::new(shell::ExecuteShellHandler::new(device.clone())));

    registry.register(Box::new(install::InstallPackageHandler::new(device.clone())));
    registry.register(Box::new(install::InstallLocalPackageHandler::new(
        device.clone(),
    )));

    registry.register(Box::new(system::ShutdownHandler::new(device.clone())));
    registry.register(Box::new(system::DisplayMessageHandler::new(device)));
    registry.register(Box::new(system::ConfigureDeviceHandler::new(config.clone())));
    registry.register(Box::new(system::ClearWifiCredentialsHandler::new(config)));
}
