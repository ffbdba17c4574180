//! Configuration module
//!
//! Handles loading and saving the agent configuration, plus the shared
//! store the connected server reconfigures at runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::device::HostDevice;
use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Management server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Device identity settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Agent behavior settings
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

/// Management server endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname or IP address
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "192.168.0.77".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
        }
    }
}

/// Identity reported in the device-connected packet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Model name (defaults to the hostname)
    #[serde(default = "default_model")]
    pub model: String,
    /// Stable serial number (auto-generated if not set)
    pub serial: Option<String>,
    /// WiFi credentials managed by the server
    #[serde(default)]
    pub wifi: WifiConfig,
}

fn default_model() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            serial: None,
            wifi: WifiConfig::default(),
        }
    }
}

/// WiFi credentials pushed via the configure-device command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: Option<String>,
    pub password: Option<String>,
}

/// Agent behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// App library directory
    #[serde(default = "default_apps_dir")]
    pub apps_dir: PathBuf,
    /// Whether server-issued shutdown/restart commands are honored
    #[serde(default)]
    pub allow_power_commands: bool,
}

fn default_apps_dir() -> PathBuf {
    HostDevice::default_apps_dir()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            apps_dir: default_apps_dir(),
            allow_power_commands: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not
    /// exist yet. Other errors still surface.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// The configuration path the agent reads and writes. An explicit
    /// override wins, then an existing file in one of the search
    /// locations, then the platform default.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }

        let candidates = [
            Self::default_path(),
            PathBuf::from("./fleetlink.toml"),
            PathBuf::from("./config.toml"),
        ];

        for path in &candidates {
            if path.exists() {
                return path.clone();
            }
        }

        Self::default_path()
    }

    /// The path configuration is saved to when no explicit path is given
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("fleetlink/config.toml"))
            .unwrap_or_else(|| PathBuf::from("./fleetlink.toml"))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Stable device serial, generated and recorded on first use.
    /// Callers should save afterwards so the serial survives restarts.
    pub fn ensure_serial(&mut self) -> String {
        match &self.device.serial {
            Some(serial) => serial.clone(),
            None => {
                let serial = uuid::Uuid::new_v4().to_string();
                self.device.serial = Some(serial.clone());
                serial
            }
        }
    }
}

/// Field rules enforced before accepting a configure-device command
pub fn validate_wifi(ssid: &str, password: &str) -> ConfigResult<()> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConfigError::Invalid(format!(
            "ssid must be 1-32 bytes, got {}",
            ssid.len()
        )));
    }
    if !password.is_empty() && !(8..=63).contains(&password.len()) {
        return Err(ConfigError::Invalid(format!(
            "password must be empty or 8-63 bytes, got {}",
            password.len()
        )));
    }
    Ok(())
}

pub fn validate_server(host: &str, port: u16) -> ConfigResult<()> {
    if host.is_empty() {
        return Err(ConfigError::Invalid(
            "server host must not be empty".to_string(),
        ));
    }
    if port == 0 {
        return Err(ConfigError::Invalid(
            "server port must be nonzero".to_string(),
        ));
    }
    Ok(())
}

/// Shared view of the active configuration.
///
/// Handlers update through this so runtime reconfiguration both persists
/// and becomes visible to the rest of the agent.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration
    pub async fn get(&self) -> Config {
        self.inner.read().await.clone()
    }

    /// Apply a change and save it to disk
    pub async fn update<F>(&self, apply: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.inner.write().await;
        apply(&mut config);
        config.save(&self.path)
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        server: ServerConfig {
            host: "192.168.0.77".to_string(),
            port: DEFAULT_PORT,
        },
        device: DeviceConfig {
            model: "Quest".to_string(),
            serial: Some("ABC123".to_string()),
            wifi: WifiConfig {
                ssid: Some("lab-wifi".to_string()),
                password: None,
            },
        },
        ..Default::default()
    };

    toml::to_string_pretty(&config).unwrap()
}
