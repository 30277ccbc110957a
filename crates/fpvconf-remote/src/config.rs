//! Remote engine configuration with YAML/TOML support

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::milestone::MilestoneTable;

/// Tunables for transport, upgrade monitoring and network scans
///
/// Every field has a default, so an empty document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub upgrade: UpgradeConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// TCP connect plus SSH handshake and login (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Default command timeout when the caller supplies none (default: 30s)
    #[serde(default = "default_command_timeout")]
    pub command_ms: u64,

    /// Single file transfer (default: 5 minutes)
    #[serde(default = "default_transfer_timeout")]
    pub transfer_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            command_ms: default_command_timeout(),
            transfer_ms: default_transfer_timeout(),
        }
    }
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_millis(self.transfer_ms)
    }
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_command_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_transfer_timeout() -> u64 {
    300_000 // 5 minutes
}

/// Upgrade monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Wall-clock limit from sending the command (default: 2 minutes)
    #[serde(default = "default_upgrade_deadline")]
    pub deadline_ms: u64,

    /// Poll interval for new output (default: 100ms)
    #[serde(default = "default_poll_interval")]
    pub poll_ms: u64,

    /// Output markers used to estimate progress
    #[serde(default)]
    pub milestones: MilestoneTable,

    /// Remote directory images are staged in before `sysupgrade`
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_upgrade_deadline(),
            poll_ms: default_poll_interval(),
            milestones: MilestoneTable::default(),
            staging_dir: default_staging_dir(),
        }
    }
}

impl UpgradeConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }
}

fn default_upgrade_deadline() -> u64 {
    120_000 // 2 minutes
}

fn default_poll_interval() -> u64 {
    100 // 100ms
}

fn default_staging_dir() -> String {
    "/tmp".to_string()
}

/// SSH client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Keepalive interval; 0 disables keepalives (default: 5s)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// Drop an idle connection after this long (default: 60s)
    #[serde(default = "default_inactivity")]
    pub inactivity_secs: u64,

    /// PTY size requested for interactive shells
    #[serde(default = "default_pty_cols")]
    pub pty_cols: u32,

    #[serde(default = "default_pty_rows")]
    pub pty_rows: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive(),
            inactivity_secs: default_inactivity(),
            pty_cols: default_pty_cols(),
            pty_rows: default_pty_rows(),
        }
    }
}

fn default_keepalive() -> u64 {
    5
}

fn default_inactivity() -> u64 {
    60
}

fn default_pty_cols() -> u32 {
    200
}

fn default_pty_rows() -> u32 {
    50
}

/// Reachability sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Port tried on every host (default: 22)
    #[serde(default = "default_scan_port")]
    pub port: u16,

    /// Per-host connect timeout (default: 300ms)
    #[serde(default = "default_scan_timeout")]
    pub timeout_ms: u64,

    /// Connection attempts in flight at once (default: 64)
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: default_scan_port(),
            timeout_ms: default_scan_timeout(),
            concurrency: default_scan_concurrency(),
        }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_scan_port() -> u16 {
    fpvconf_core::DEFAULT_SSH_PORT
}

fn default_scan_timeout() -> u64 {
    300
}

fn default_scan_concurrency() -> usize {
    64
}

impl RemoteConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upgrade
            .milestones
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.scan.concurrency == 0 {
            return Err(ConfigError::Invalid("scan.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
