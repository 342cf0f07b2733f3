//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the fleet runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_device_type() -> String {
    "powermeter".to_owned()
}

fn default_aggregation_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_port() -> u16 {
    502
}

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_collect_snaps_interval() -> Duration {
    Duration::from_millis(60_000)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object for the fleet runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "PMFLEET_CONFIG";

    /// Load configuration from disk, respecting the `PMFLEET_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a device configuration by identifier.
    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.get(device_id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(anyhow!("configuration must contain at least one device"));
        }
        if self.fleet.aggregation_interval.is_zero() {
            return Err(anyhow!("fleet aggregation_interval must be non-zero"));
        }
        for (device_id, device) in &self.devices {
            device.validate(device_id)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Key into the aggregation specs table.
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default = "default_aggregation_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub aggregation_interval: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            device_type: default_device_type(),
            aggregation_interval: default_aggregation_interval(),
        }
    }
}

/// Byte source used to reach a device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Simulator,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub unit_id: Option<u8>,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_collect_snaps_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub collect_snaps_interval: Duration,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub transport: TransportKind,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_port(),
            unit_id: None,
            timeout: default_timeout(),
            collect_snaps_interval: default_collect_snaps_interval(),
            pos: None,
            container: None,
            transport: TransportKind::default(),
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self, device_id: &str) -> Result<()> {
        if self.collect_snaps_interval.is_zero() {
            return Err(anyhow!(
                "device '{}' must use a non-zero collect_snaps_interval",
                device_id
            ));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("device '{}' must use a non-zero timeout", device_id));
        }
        Ok(())
    }

    /// Whether enough endpoint information exists to open a client.
    pub fn is_connectable(&self) -> bool {
        !self.address.trim().is_empty() && self.port != 0 && self.unit_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
