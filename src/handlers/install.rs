//! Package installation.
//!
//! Transfers can take a while, so the actual work runs in a spawned task
//! and streams progress packets; dispatch returns as soon as the request
//! is parsed. The final install response is sent after the last progress
//! packet.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{HandlerResult, PacketHandler};
use crate::device::{DeviceControl, InstallProgress};
use crate::protocol::{opcode, PacketReader};
use crate::session::SessionHandle;

async fn run_install(device: Arc<dyn DeviceControl>, session: SessionHandle, source: String) {
    let (progress_tx, mut progress_rx) = mpsc::channel::<InstallProgress>(32);

    let forward_session = session.clone();
    let forward = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match event {
                InstallProgress::Started { total } => {
                    forward_session
                        .send_packet(opcode::DOWNLOAD_STARTED, |w| w.write_u64(total))
                        .await;
                }
                InstallProgress::Transferred { done, total } => {
                    forward_session
                        .send_packet(opcode::DOWNLOAD_PROGRESS, |w| {
                            w.write_u64(done);
                            w.write_u64(total);
                        })
                        .await;
                }
                InstallProgress::Installing { percent } => {
                    forward_session
                        .send_packet(opcode::INSTALL_PROGRESS, |w| w.write_u8(percent))
                        .await;
                }
            }
        }
    });

    let result = device.install_package(&source, progress_tx).await;
    // The progress sender is gone once install returns; wait so every
    // progress packet precedes the final response
    let _ = forward.await;

    match result {
        Ok(message) => {
            tracing::info!("Install finished: {}", message);
            session
                .send_packet(opcode::PACKAGE_INSTALL_RESPONSE, |w| {
                    w.write_u8(1);
                    w.write_string(&message);
                })
                .await;
        }
        Err(e) => {
            tracing::warn!("Install of {} failed: {}", source, e);
            session
                .send_packet(opcode::PACKAGE_INSTALL_RESPONSE, |w| {
                    w.write_u8(0);
                    w.write_string(&e.to_string());
                })
                .await;
        }
    }
}

/// Installs a package from a server-supplied URL.
pub struct InstallPackageHandler {
    device: Arc<dyn DeviceControl>,
}

impl InstallPackageHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for InstallPackageHandler {
    fn opcode(&self) -> u8 {
        opcode::INSTALL_PACKAGE
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let url = reader.read_string()?;
        tracing::info!("Install requested from {}", url);

        tokio::spawn(run_install(self.device.clone(), session.clone(), url));
        Ok(())
    }
}

/// Installs a package already present on the device.
pub struct InstallLocalPackageHandler {
    device: Arc<dyn DeviceControl>,
}

impl InstallLocalPackageHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for InstallLocalPackageHandler {
    fn opcode(&self) -> u8 {
        opcode::INSTALL_LOCAL_PACKAGE
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let path = reader.read_string()?;
        tracing::info!("Local install requested for {}", path);

        tokio::spawn(run_install(self.device.clone(), session.clone(), path));
        Ok(())
    }
}
