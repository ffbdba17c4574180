//! System-level commands: power, display message, reconfiguration.

use std::sync::Arc;

use async_trait::async_trait;

use super::{HandlerResult, PacketHandler};
use crate::config::{validate_server, validate_wifi, ConfigResult, ConfigStore};
use crate::device::{DeviceControl, PowerAction};
use crate::protocol::{opcode, PacketReader};
use crate::session::SessionHandle;

/// Shuts down or restarts the device.
///
/// A successful power action sends no response; the device goes away and
/// the server sees the connection drop. Invalid or refused actions are
/// reported through the error packet.
pub struct ShutdownHandler {
    device: Arc<dyn DeviceControl>,
}

impl ShutdownHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for ShutdownHandler {
    fn opcode(&self) -> u8 {
        opcode::SHUTDOWN
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let action = reader.read_string()?;

        let power_action = match PowerAction::parse(&action) {
            Some(power_action) => power_action,
            None => {
                session
                    .send_error(&format!("Invalid power action: {}", action))
                    .await;
                return Ok(());
            }
        };

        match self.device.power(power_action).await {
            Ok(()) => {
                tracing::warn!("Power action accepted: {}", action);
                session.request_shutdown().await;
            }
            Err(e) => {
                session
                    .send_error(&format!("Power command refused: {}", e))
                    .await;
            }
        }
        Ok(())
    }
}

/// Shows a server-sent message on the device.
pub struct DisplayMessageHandler {
    device: Arc<dyn DeviceControl>,
}

impl DisplayMessageHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for DisplayMessageHandler {
    fn opcode(&self) -> u8 {
        opcode::DISPLAY_MESSAGE
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        _session: &SessionHandle,
    ) -> HandlerResult<()> {
        let message = reader.read_string()?;
        self.device.display_message(&message).await?;
        Ok(())
    }
}

/// Applies server-pushed configuration: optional WiFi credentials plus the
/// server endpoint. Sends no response; on success the session restarts so
/// the new endpoint takes effect immediately.
pub struct ConfigureDeviceHandler {
    config: ConfigStore,
}

impl ConfigureDeviceHandler {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }

    async fn apply(
        &self,
        wifi: Option<(String, String)>,
        host: String,
        port: u16,
    ) -> ConfigResult<()> {
        if let Some((ssid, password)) = &wifi {
            validate_wifi(ssid, password)?;
        }
        validate_server(&host, port)?;

        self.config
            .update(|config| {
                if let Some((ssid, password)) = wifi {
                    config.device.wifi.ssid = Some(ssid);
                    // An empty password means an open network
                    config.device.wifi.password =
                        if password.is_empty() { None } else { Some(password) };
                }
                config.server.host = host;
                config.server.port = port;
            })
            .await
    }
}

#[async_trait]
impl PacketHandler for ConfigureDeviceHandler {
    fn opcode(&self) -> u8 {
        opcode::CONFIGURE_DEVICE
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let has_wifi = reader.read_u8()? != 0;
        let wifi = if has_wifi {
            let ssid = reader.read_string()?;
            let password = reader.read_string()?;
            Some((ssid, password))
        } else {
            None
        };
        let host = reader.read_string()?;
        let port = reader.read_u16()?;

        if let Err(e) = self.apply(wifi, host.clone(), port).await {
            session
                .send_error(&format!("Configuration rejected: {}", e))
                .await;
            return Ok(());
        }

        tracing::info!("Device reconfigured for {}:{}, restarting session", host, port);
        session.request_restart().await;
        Ok(())
    }
}

/// Forgets stored WiFi credentials and restarts the session.
pub struct ClearWifiCredentialsHandler {
    config: ConfigStore,
}

impl ClearWifiCredentialsHandler {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PacketHandler for ClearWifiCredentialsHandler {
    fn opcode(&self) -> u8 {
        opcode::CLEAR_WIFI_CREDENTIALS
    }

    async fn handle(
        &self,
        _reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let result = self
            .config
            .update(|config| {
                config.device.wifi.ssid = None;
                config.device.wifi.password = None;
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!("WiFi credentials cleared, restarting session");
                session.request_restart().await;
            }
            Err(e) => {
                session
                    .send_error(&format!("Failed to clear WiFi credentials: {}", e))
                    .await;
            }
        }
        Ok(())
    }
}
