//! Scriptable in-memory device used by handler and session tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    BatteryStatus, CloseReport, DeviceControl, DeviceError, DeviceInfo, DeviceResult,
    InstallProgress, PowerAction, ShellOutput, VolumeStatus,
};

/// Test device: canned state in, recorded calls out.
pub struct MockDevice {
    pub info: DeviceInfo,
    pub battery: BatteryStatus,
    pub volume: Mutex<VolumeStatus>,
    /// Apps considered installed; launch/uninstall consult this
    pub apps: Mutex<Vec<String>>,
    pub shell_output: Mutex<ShellOutput>,
    pub allow_power: bool,
    pub launched: Mutex<Vec<String>>,
    pub uninstalled: Mutex<Vec<String>>,
    pub shell_commands: Mutex<Vec<String>>,
    pub installed_sources: Mutex<Vec<String>>,
    pub power_actions: Mutex<Vec<PowerAction>>,
    pub displayed: Mutex<Vec<String>>,
    pub close_calls: Mutex<u32>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            info: DeviceInfo::new("Quest", "ABC123"),
            battery: BatteryStatus {
                level: 87,
                charging: true,
            },
            volume: Mutex::new(VolumeStatus {
                percent: 53,
                current: 8,
                max: 15,
            }),
            apps: Mutex::new(vec!["alpha".to_string(), "beta".to_string()]),
            shell_output: Mutex::new(ShellOutput {
                success: true,
                output: "ok\n".to_string(),
                exit_code: 0,
            }),
            allow_power: true,
            launched: Mutex::new(Vec::new()),
            uninstalled: Mutex::new(Vec::new()),
            shell_commands: Mutex::new(Vec::new()),
            installed_sources: Mutex::new(Vec::new()),
            power_actions: Mutex::new(Vec::new()),
            displayed: Mutex::new(Vec::new()),
            close_calls: Mutex::new(0),
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceControl for MockDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    async fn battery_status(&self) -> BatteryStatus {
        self.battery
    }

    async fn volume_status(&self) -> DeviceResult<VolumeStatus> {
        Ok(*self.volume.lock().unwrap())
    }

    async fn set_volume(&self, percent: u8) -> DeviceResult<VolumeStatus> {
        let mut volume = self.volume.lock().unwrap();
        let percent = percent.min(100);
        volume.percent = percent;
        volume.current = (u16::from(percent) * u16::from(volume.max) / 100) as u8;
        Ok(*volume)
    }

    async fn launch_app(&self, package: &str) -> DeviceResult<String> {
        if !self.apps.lock().unwrap().iter().any(|a| a == package) {
            return Err(DeviceError::NotFound(format!("app not found: {}", package)));
        }
        self.launched.lock().unwrap().push(package.to_string());
        Ok(package.to_string())
    }

    async fn close_all_apps(&self) -> DeviceResult<CloseReport> {
        *self.close_calls.lock().unwrap() += 1;
        let closed = self.launched.lock().unwrap().drain(..).collect();
        Ok(CloseReport { closed })
    }

    async fn installed_apps(&self) -> DeviceResult<Vec<String>> {
        Ok(self.apps.lock().unwrap().clone())
    }

    async fn execute_shell(&self, command: &str) -> DeviceResult<ShellOutput> {
        self.shell_commands.lock().unwrap().push(command.to_string());
        Ok(self.shell_output.lock().unwrap().clone())
    }

    async fn install_package(
        &self,
        source: &str,
        progress: mpsc::Sender<InstallProgress>,
    ) -> DeviceResult<String> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Err(DeviceError::Unsupported(
                "remote URL installs are not supported".to_string(),
            ));
        }

        let total = 1000;
        let _ = progress.send(InstallProgress::Started { total }).await;
        let _ = progress
            .send(InstallProgress::Transferred { done: total, total })
            .await;
        let _ = progress
            .send(InstallProgress::Installing { percent: 100 })
            .await;

        self.installed_sources.lock().unwrap().push(source.to_string());
        self.apps.lock().unwrap().push(source.to_string());
        Ok(format!("Installed {}", source))
    }

    async fn uninstall_app(&self, package: &str) -> DeviceResult<String> {
        let mut apps = self.apps.lock().unwrap();
        let before = apps.len();
        apps.retain(|a| a != package);
        if apps.len() == before {
            return Err(DeviceError::NotFound(format!("app not found: {}", package)));
        }
        self.uninstalled.lock().unwrap().push(package.to_string());
        Ok(format!("Uninstalled {}", package))
    }

    async fn power(&self, action: PowerAction) -> DeviceResult<()> {
        if !self.allow_power {
            return Err(DeviceError::Refused(
                "power commands are disabled".to_string(),
            ));
        }
        self.power_actions.lock().unwrap().push(action);
        Ok(())
    }

    async fn display_message(&self, message: &str) -> DeviceResult<()> {
        self.displayed.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
