//! Host device backend
//!
//! Implements [`DeviceControl`] for the machine the agent runs on. Apps are
//! executables kept in a library directory; installs copy into it, launches
//! spawn from it (falling back to `PATH`), and close-all kills whatever this
//! agent spawned. Volume is a software mixer with a fixed step range, and
//! power commands shell out to `systemctl` behind a config gate.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, RwLock};

use super::{
    BatteryStatus, CloseReport, DeviceControl, DeviceError, DeviceInfo, DeviceResult,
    InstallProgress, PowerAction, ShellOutput, VolumeStatus,
};

/// Software mixer step range, volume is current/max
const MAX_VOLUME_STEPS: u8 = 15;

const COPY_CHUNK_LEN: usize = 64 * 1024;

pub struct HostDevice {
    info: DeviceInfo,
    apps_dir: PathBuf,
    allow_power_commands: bool,
    volume_step: RwLock<u8>,
    /// Apps spawned by this agent, by package name
    children: Mutex<Vec<(String, Child)>>,
}

impl HostDevice {
    pub fn new(info: DeviceInfo, apps_dir: PathBuf, allow_power_commands: bool) -> Self {
        Self {
            info,
            apps_dir,
            allow_power_commands,
            volume_step: RwLock::new(8),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Default app library location under the platform data directory.
    pub fn default_apps_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join("fleetlink").join("apps"))
            .unwrap_or_else(|| PathBuf::from("./apps"))
    }
}

fn volume_from_step(step: u8) -> VolumeStatus {
    VolumeStatus {
        percent: (u16::from(step) * 100 / u16::from(MAX_VOLUME_STEPS)) as u8,
        current: step,
        max: MAX_VOLUME_STEPS,
    }
}

/// App names address files directly under the library directory.
fn validate_app_name(package: &str) -> DeviceResult<()> {
    if package.is_empty() {
        return Err(DeviceError::InvalidArgument("empty app name".to_string()));
    }
    if package.contains('/') || package.contains('\\') || package == "." || package == ".." {
        return Err(DeviceError::InvalidArgument(format!(
            "app name must not contain path separators: {}",
            package
        )));
    }
    Ok(())
}

fn app_display_name(package: &str) -> String {
    Path::new(package)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| package.to_string())
}

/// Probe /sys for a battery. Absent or unreadable means no battery.
async fn read_battery() -> Option<BatteryStatus> {
    let mut entries = fs::read_dir("/sys/class/power_supply").await.ok()?;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let kind = fs::read_to_string(path.join("type")).await.unwrap_or_default();
        if kind.trim() != "Battery" {
            continue;
        }

        let level = fs::read_to_string(path.join("capacity"))
            .await
            .ok()?
            .trim()
            .parse::<u8>()
            .ok()?;
        let status = fs::read_to_string(path.join("status")).await.unwrap_or_default();
        let charging = matches!(status.trim(), "Charging" | "Full");

        return Some(BatteryStatus {
            level: level.min(100),
            charging,
        });
    }

    None
}

#[async_trait]
impl DeviceControl for HostDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    async fn battery_status(&self) -> BatteryStatus {
        read_battery().await.unwrap_or(BatteryStatus {
            level: 0,
            charging: false,
        })
    }

    async fn volume_status(&self) -> DeviceResult<VolumeStatus> {
        Ok(volume_from_step(*self.volume_step.read().await))
    }

    async fn set_volume(&self, percent: u8) -> DeviceResult<VolumeStatus> {
        let percent = percent.min(100);
        let step = ((u16::from(percent) * u16::from(MAX_VOLUME_STEPS) + 50) / 100) as u8;

        *self.volume_step.write().await = step;
        let status = volume_from_step(step);
        tracing::info!(
            "Volume set to {}% ({}/{})",
            status.percent,
            status.current,
            status.max
        );
        Ok(status)
    }

    async fn launch_app(&self, package: &str) -> DeviceResult<String> {
        validate_app_name(package)?;

        let library_path = self.apps_dir.join(package);
        let program = if fs::try_exists(&library_path).await.unwrap_or(false) {
            library_path
        } else {
            // Not in the library; let PATH resolve it
            PathBuf::from(package)
        };

        let child = Command::new(&program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DeviceError::NotFound(format!("app not found: {}", package))
                }
                _ => DeviceError::Io(e),
            })?;

        tracing::info!("Launched {} (pid {:?})", package, child.id());
        self.children.lock().await.push((package.to_string(), child));
        Ok(app_display_name(package))
    }

    async fn close_all_apps(&self) -> DeviceResult<CloseReport> {
        let mut children = self.children.lock().await;
        let mut closed = Vec::new();

        for (name, mut child) in children.drain(..) {
            // Exited on its own; nothing to close
            if matches!(child.try_wait(), Ok(Some(_))) {
                continue;
            }
            if child.kill().await.is_ok() {
                closed.push(name);
            }
        }

        tracing::info!("Closed {} running app(s)", closed.len());
        Ok(CloseReport { closed })
    }

    async fn installed_apps(&self) -> DeviceResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.apps_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DeviceError::Io(e)),
        };

        let mut apps = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                apps.push(name.to_string());
            }
        }

        apps.sort();
        Ok(apps)
    }

    async fn execute_shell(&self, command: &str) -> DeviceResult<ShellOutput> {
        tracing::debug!("Executing shell command: {}", command);

        let result = Command::new("sh").arg("-c").arg(command).output().await?;

        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr);
        if !stderr.is_empty() {
            output.push_str(&stderr);
        }

        Ok(ShellOutput {
            success: result.status.success(),
            output,
            exit_code: result.status.code().unwrap_or(-1),
        })
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

        let source_path = Path::new(source);
        let file_name = source_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DeviceError::InvalidArgument(format!("not a file path: {}", source)))?
            .to_string();

        let total = fs::metadata(source_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DeviceError::NotFound(format!("package not found: {}", source))
                }
                _ => DeviceError::Io(e),
            })?
            .len();

        let _ = progress.send(InstallProgress::Started { total }).await;

        fs::create_dir_all(&self.apps_dir).await?;
        let dest_path = self.apps_dir.join(&file_name);

        let mut src = fs::File::open(source_path).await?;
        let mut dst = fs::File::create(&dest_path).await?;

        let mut done: u64 = 0;
        let mut buf = vec![0u8; COPY_CHUNK_LEN];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n]).await?;
            done += n as u64;
            let _ = progress
                .send(InstallProgress::Transferred { done, total })
                .await;
        }
        dst.flush().await?;
        drop(dst);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest_path, std::fs::Permissions::from_mode(0o755)).await?;
        }

        let _ = progress
            .send(InstallProgress::Installing { percent: 100 })
            .await;

        tracing::info!("Installed {} ({} bytes)", file_name, total);
        Ok(format!("Installed {}", file_name))
    }

    async fn uninstall_app(&self, package: &str) -> DeviceResult<String> {
        validate_app_name(package)?;

        let path = self.apps_dir.join(package);
        let metadata = fs::metadata(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                DeviceError::NotFound(format!("app not found: {}", package))
            }
            _ => DeviceError::Io(e),
        })?;

        if metadata.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }

        tracing::info!("Uninstalled {}", package);
        Ok(format!("Uninstalled {}", package))
    }

    async fn power(&self, action: PowerAction) -> DeviceResult<()> {
        if !self.allow_power_commands {
            return Err(DeviceError::Refused(
                "power commands are disabled".to_string(),
            ));
        }

        let arg = match action {
            PowerAction::Shutdown => "poweroff",
            PowerAction::Restart => "reboot",
        };

        tracing::warn!("Executing power action: {:?}", action);
        let status = Command::new("systemctl").arg(arg).status().await?;
        if !status.success() {
            return Err(DeviceError::Refused(format!(
                "power command exited with {}",
                status
            )));
        }
        Ok(())
    }

    async fn display_message(&self, message: &str) -> DeviceResult<()> {
        tracing::info!("Message from server: {}", message);
        Ok(())
    }
}
