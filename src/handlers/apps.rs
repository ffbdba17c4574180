//! App lifecycle commands: launch, list, uninstall, close-all.

use std::sync::Arc;

use async_trait::async_trait;

use super::{HandlerResult, PacketHandler};
use crate::device::DeviceControl;
use crate::protocol::{opcode, PacketReader};
use crate::session::SessionHandle;

/// Launches an app and reports the foreground change on success.
pub struct LaunchAppHandler {
    device: Arc<dyn DeviceControl>,
}

impl LaunchAppHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for LaunchAppHandler {
    fn opcode(&self) -> u8 {
        opcode::LAUNCH_APP
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let package = reader.read_string()?;

        match self.device.launch_app(&package).await {
            Ok(app_name) => {
                session
                    .send_packet(opcode::LAUNCH_APP_RESPONSE, |w| {
                        w.write_u8(1);
                        w.write_string(&format!("Launched {}", app_name));
                    })
                    .await;
                session.foreground_app_changed(&package, &app_name).await;
            }
            Err(e) => {
                tracing::warn!("Launch of {} failed: {}", package, e);
                session
                    .send_packet(opcode::LAUNCH_APP_RESPONSE, |w| {
                        w.write_u8(0);
                        w.write_string(&e.to_string());
                    })
                    .await;
            }
        }
        Ok(())
    }
}

/// Lists installed apps.
pub struct RequestInstalledAppsHandler {
    device: Arc<dyn DeviceControl>,
}

impl RequestInstalledAppsHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for RequestInstalledAppsHandler {
    fn opcode(&self) -> u8 {
        opcode::REQUEST_INSTALLED_APPS
    }

    async fn handle(
        &self,
        _reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let apps = self.device.installed_apps().await?;

        session
            .send_packet(opcode::INSTALLED_APPS_RESPONSE, |w| {
                w.write_u32(apps.len() as u32);
                for app in &apps {
                    w.write_string(app);
                }
            })
            .await;
        Ok(())
    }
}

/// Removes an installed app.
pub struct UninstallAppHandler {
    device: Arc<dyn DeviceControl>,
}

impl UninstallAppHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for UninstallAppHandler {
    fn opcode(&self) -> u8 {
        opcode::UNINSTALL_APP
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let package = reader.read_string()?;

        let (success, message) = match self.device.uninstall_app(&package).await {
            Ok(message) => (1u8, message),
            Err(e) => {
                tracing::warn!("Uninstall of {} failed: {}", package, e);
                (0u8, e.to_string())
            }
        };

        session
            .send_packet(opcode::UNINSTALL_APP_RESPONSE, |w| {
                w.write_u8(success);
                w.write_string(&message);
            })
            .await;
        Ok(())
    }
}

/// Closes every app the agent launched and reports their names.
pub struct CloseAllAppsHandler {
    device: Arc<dyn DeviceControl>,
}

impl CloseAllAppsHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for CloseAllAppsHandler {
    fn opcode(&self) -> u8 {
        opcode::CLOSE_ALL_APPS
    }

    async fn handle(
        &self,
        _reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        match self.device.close_all_apps().await {
            Ok(report) => {
                session
                    .send_packet(opcode::CLOSE_ALL_APPS_RESPONSE, |w| {
                        w.write_u8(1);
                        w.write_string(&format!("Closed {} app(s)", report.closed.len()));
                        w.write_u32(report.closed.len() as u32);
                        for app in &report.closed {
                            w.write_string(app);
                        }
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!("Close-all failed: {}", e);
                session
                    .send_packet(opcode::CLOSE_ALL_APPS_RESPONSE, |w| {
                        w.write_u8(0);
                        w.write_string(&e.to_string());
                        w.write_u32(0);
                    })
                    .await;
            }
        }
        Ok(())
    }
}
