//! Status queries: battery, volume, ping.

use std::sync::Arc;

use async_trait::async_trait;

use super::{HandlerResult, PacketHandler};
use crate::device::{DeviceControl, VolumeStatus};
use crate::protocol::{opcode, PacketReader};
use crate::session::SessionHandle;

async fn send_volume_status(session: &SessionHandle, status: VolumeStatus) {
    session
        .send_packet(opcode::VOLUME_STATUS, |w| {
            w.write_u8(status.percent);
            w.write_u8(status.current);
            w.write_u8(status.max);
        })
        .await;
}

/// Responds to battery queries with the current charge snapshot.
pub struct RequestBatteryHandler {
    device: Arc<dyn DeviceControl>,
}

impl RequestBatteryHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for RequestBatteryHandler {
    fn opcode(&self) -> u8 {
        opcode::REQUEST_BATTERY
    }

    async fn handle(
        &self,
        _reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let battery = self.device.battery_status().await;
        session
            .send_packet(opcode::BATTERY_STATUS, |w| {
                w.write_u8(battery.level);
                w.write_u8(battery.charging as u8);
            })
            .await;
        Ok(())
    }
}

/// Reports the current volume.
pub struct GetVolumeHandler {
    device: Arc<dyn DeviceControl>,
}

impl GetVolumeHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for GetVolumeHandler {
    fn opcode(&self) -> u8 {
        opcode::GET_VOLUME
    }

    async fn handle(
        &self,
        _reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let status = self.device.volume_status().await?;
        send_volume_status(session, status).await;
        Ok(())
    }
}

/// Applies a requested volume, acknowledging with the resulting state.
pub struct SetVolumeHandler {
    device: Arc<dyn DeviceControl>,
}

impl SetVolumeHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for SetVolumeHandler {
    fn opcode(&self) -> u8 {
        opcode::SET_VOLUME
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let percent = reader.read_u8()?;

        match self.device.set_volume(percent).await {
            Ok(status) => {
                session
                    .send_packet(opcode::VOLUME_SET_RESPONSE, |w| {
                        w.write_u8(1);
                        w.write_string(&format!("Volume set to {}%", status.percent));
                    })
                    .await;
                send_volume_status(session, status).await;
            }
            Err(e) => {
                session
                    .send_packet(opcode::VOLUME_SET_RESPONSE, |w| {
                        w.write_u8(0);
                        w.write_string(&e.to_string());
                    })
                    .await;
            }
        }
        Ok(())
    }
}

/// Liveness probe; answers with the device identity.
pub struct PingHandler {
    device: Arc<dyn DeviceControl>,
}

impl PingHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for PingHandler {
    fn opcode(&self) -> u8 {
        opcode::PING
    }

    async fn handle(
        &self,
        _reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let info = self.device.info();
        session
            .send_packet(opcode::PING_RESPONSE, |w| {
                w.write_string(&format!("{} ({})", info.model, info.serial));
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::device::mock::MockDevice;
    use crate::handlers::testutil::{expect_frame, payload_of};
    use crate::handlers::HandlerError;

    #[tokio::test]
    async fn test_battery_response() {
        let device = Arc::new(MockDevice::new());
        let (session, mut outbound, _control) = SessionHandle::test_pair(8);
        let handler = RequestBatteryHandler::new(device);

        let mut reader = PacketReader::new(&[]);
        handler.handle(&mut reader, &session).await.unwrap();

        let frame = expect_frame(&mut outbound, opcode::BATTERY_STATUS).await;
        assert_eq!(payload_of(&frame), &[87, 1]);
    }

    #[tokio::test]
    async fn test_get_volume_response() {
        let device = Arc::new(MockDevice::new());
        let (session, mut outbound, _control) = SessionHandle::test_pair(8);
        let handler = GetVolumeHandler::new(device);

        let mut reader = PacketReader::new(&[]);
        handler.handle(&mut reader, &session).await.unwrap();

        let frame = expect_frame(&mut outbound, opcode::VOLUME_STATUS).await;
        assert_eq!(payload_of(&frame), &[53, 8, 15]);
    }

    #[tokio::test]
    async fn test_set_volume_acks_then_reports() {
        let device = Arc::new(MockDevice::new());
        let (session, mut outbound, _control) = SessionHandle::test_pair(8);
        let handler = SetVolumeHandler::new(device.clone());

        let payload = Bytes::from_static(&[80]);
        let mut reader = PacketReader::new(&payload);
        handler.handle(&mut reader, &session).await.unwrap();

        let frame = expect_frame(&mut outbound, opcode::VOLUME_SET_RESPONSE).await;
        let mut response = PacketReader::new(payload_of(&frame));
        assert_eq!(response.read_u8().unwrap(), 1);
        assert_eq!(response.read_string().unwrap(), "Volume set to 80%");

        let frame = expect_frame(&mut outbound, opcode::VOLUME_STATUS).await;
        assert_eq!(payload_of(&frame), &[80, 12, 15]);
    }

    #[tokio::test]
    async fn test_set_volume_rejects_short_payload() {
        let device = Arc::new(MockDevice::new());
        let (session, mut outbound, _control) = SessionHandle::test_pair(8);
        let handler = SetVolumeHandler::new(device);

        let mut reader = PacketReader::new(&[]);
        let err = handler.handle(&mut reader, &session).await.unwrap_err();
        assert!(matches!(err, HandlerError::Payload(_)));
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_reports_identity() {
        let device = Arc::new(MockDevice::new());
        let (session, mut outbound, _control) = SessionHandle::test_pair(8);
        let handler = PingHandler::new(device);

        let mut reader = PacketReader::new(&[]);
        handler.handle(&mut reader, &session).await.unwrap();

        let frame = expect_frame(&mut outbound, opcode::PING_RESPONSE).await;
        let mut response = PacketReader::new(payload_of(&frame));
        assert_eq!(response.read_string().unwrap(), "Quest (ABC123)");
    }
}
