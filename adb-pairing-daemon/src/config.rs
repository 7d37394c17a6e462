//! Daemon Configuration
//!
//! Configuration management for the pairing daemon.

use adb_pairing_protocol::discovery::ADB_PAIRING_SERVICE_TYPE;
use adb_pairing_protocol::{DiscoveryConfig, PairingConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "daemon.toml";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration
    pub device: DeviceConfig,

    /// Pairing configuration
    #[serde(default)]
    pub pairing: PairingSection,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoverySection,

    /// Storage paths
    pub paths: PathConfig,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name announced to the pairing service
    pub name: String,
}

/// Pairing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingSection {
    /// TCP connect plus TLS handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-message timeout in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Stop discovery once a pairing succeeds
    #[serde(default = "default_true")]
    pub stop_discovery_on_success: bool,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// mDNS service type of the pairing service
    #[serde(default = "default_service_type")]
    pub service_type: String,
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Configuration directory
    pub config_dir: PathBuf,

    /// Data directory (holds the identity store)
    pub data_dir: PathBuf,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_io_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_service_type() -> String {
    ADB_PAIRING_SERVICE_TYPE.to_string()
}

impl Default for PairingSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            io_timeout_secs: default_io_timeout(),
            stop_discovery_on_success: default_true(),
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("adb-pairing")
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("adb-pairing");

        Self {
            device: DeviceConfig {
                name: format!(
                    "adb-pairing@{}",
                    hostname::get()
                        .ok()
                        .and_then(|h| h.into_string().ok())
                        .unwrap_or_else(|| "localhost".to_string())
                ),
            },
            pairing: PairingSection::default(),
            discovery: DiscoverySection::default(),
            paths: PathConfig {
                config_dir: default_config_dir(),
                data_dir,
            },
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_dir().join(CONFIG_FILE))
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let mut config = Config::default();
            if let Some(dir) = path.parent() {
                config.paths.config_dir = dir.to_path_buf();
            }
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(self.config_path(), contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.paths.config_dir.join(CONFIG_FILE)
    }

    /// Directory of the identity key-value store
    pub fn identity_store_dir(&self) -> PathBuf {
        self.paths.data_dir.join("identity")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir).context("Failed to create config directory")?;
        fs::create_dir_all(self.identity_store_dir())
            .context("Failed to create identity directory")?;
        Ok(())
    }

    pub fn pairing_config(&self) -> PairingConfig {
        PairingConfig {
            connect_timeout: Duration::from_secs(self.pairing.connect_timeout_secs),
            io_timeout: Duration::from_secs(self.pairing.io_timeout_secs),
            stop_discovery_on_success: self.pairing.stop_discovery_on_success,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            service_type: self.discovery.service_type.clone(),
        }
    }
}
