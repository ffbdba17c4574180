//! Device module - the capability surface handlers act on
//!
//! Defines the common interface a managed device must provide. The protocol
//! engine only ever talks to [`DeviceControl`], so alternative backends can
//! be injected without touching the handlers.

mod host;

pub use host::HostDevice;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Refused: {0}")]
    Refused(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Identity reported in the device-connected packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
}

impl DeviceInfo {
    pub fn new(model: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            serial: serial.into(),
        }
    }
}

/// Battery snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Charge level 0-100
    pub level: u8,
    pub charging: bool,
}

/// Volume snapshot: overall percentage plus the raw mixer step range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStatus {
    pub percent: u8,
    pub current: u8,
    pub max: u8,
}

/// Result of a shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
}

/// Apps closed by a close-all request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: Vec<String>,
}

/// Progress notifications emitted while installing a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallProgress {
    /// Transfer began; total size in bytes
    Started { total: u64 },
    /// Bytes transferred so far
    Transferred { done: u64, total: u64 },
    /// Installation phase percentage
    Installing { percent: u8 },
}

/// Power state change requested by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Shutdown,
    Restart,
}

impl PowerAction {
    /// Parse the wire action string. Anything else is invalid.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "shutdown" => Some(Self::Shutdown),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }
}

/// Capability surface of a managed device
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Identity used when introducing this device to the server
    fn info(&self) -> DeviceInfo;

    /// Best-effort battery snapshot; devices without a battery report empty
    async fn battery_status(&self) -> BatteryStatus;

    /// Current volume
    async fn volume_status(&self) -> DeviceResult<VolumeStatus>;

    /// Set volume to a percentage (clamped to 100); returns the new state
    async fn set_volume(&self, percent: u8) -> DeviceResult<VolumeStatus>;

    /// Launch an app by package name; returns the resolved app name
    async fn launch_app(&self, package: &str) -> DeviceResult<String>;

    /// Close every app this device launched; returns what was closed
    async fn close_all_apps(&self) -> DeviceResult<CloseReport>;

    /// List installed app package names
    async fn installed_apps(&self) -> DeviceResult<Vec<String>>;

    /// Run a shell command to completion
    async fn execute_shell(&self, command: &str) -> DeviceResult<ShellOutput>;

    /// Install a package from `source`, reporting progress along the way.
    /// Returns a human-readable success message.
    async fn install_package(
        &self,
        source: &str,
        progress: mpsc::Sender<InstallProgress>,
    ) -> DeviceResult<String>;

    /// Remove an installed app; returns a human-readable success message
    async fn uninstall_app(&self, package: &str) -> DeviceResult<String>;

    /// Shut down or restart the device
    async fn power(&self, action: PowerAction) -> DeviceResult<()>;

    /// Show a message to whoever is looking at the device
    async fn display_message(&self, message: &str) -> DeviceResult<()>;
}

#[cfg(test)]
pub mod mock;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_action_parse() {
        assert_eq!(PowerAction::parse("shutdown"), Some(PowerAction::Shutdown));
        assert_eq!(PowerAction::parse("restart"), Some(PowerAction::Restart));
        assert_eq!(PowerAction::parse("reboot"), None);
        assert_eq!(PowerAction::parse("SHUTDOWN"), None);
        assert_eq!(PowerAction::parse(""), None);
    }

    #[test]
    fn test_device_info_new() {
        let info = DeviceInfo::new("Quest", "ABC123");
        assert_eq!(info.model, "Quest");
        assert_eq!(info.serial, "ABC123");
    }
}
