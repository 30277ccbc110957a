//! Configuration file handling for fpvconf

use anyhow::{Context, Result};
use fpvconf_core::{DeviceKind, DeviceTarget, DEFAULT_SSH_PORT};
use fpvconf_remote::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Login OpenIPC firmware ships with
const DEFAULT_USER: &str = "root";
const DEFAULT_PASSWORD: &str = "12345";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default device address
    pub host: Option<String>,
    /// SSH port
    pub port: Option<u16>,
    /// Login user
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Device class (camera or ground_station)
    pub kind: Option<DeviceKind>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Remote engine tunables
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.remote.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("fpvconf");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: &DeviceArgs, no_color: bool) -> MergedConfig {
        MergedConfig {
            host: args.host.clone().or_else(|| self.host.clone()),
            port: args.port.or(self.port).unwrap_or(DEFAULT_SSH_PORT),
            username: args
                .username
                .clone()
                .or_else(|| self.username.clone())
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: args
                .password
                .clone()
                .or_else(|| self.password.clone())
                .unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            kind: args.kind.or(self.kind).unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
            remote: self.remote.clone(),
        }
    }
}

/// Device connection flags as given on the command line
#[derive(Debug, Clone, Default)]
pub struct DeviceArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub kind: Option<DeviceKind>,
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub kind: DeviceKind,
    pub no_color: bool,
    pub remote: RemoteConfig,
}

impl MergedConfig {
    /// Target for commands that talk to one device
    pub fn target(&self) -> Result<DeviceTarget> {
        let host = self
            .host
            .as_deref()
            .context("No device host given (use --host, FPVCONF_HOST or the config file)")?;
        Ok(DeviceTarget::new(
            host,
            self.port,
            &self.username,
            &self.password,
            self.kind,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_file() {
        let config = Config::parse(
            r#"
host = "192.168.1.10"
password = "secret"
kind = "ground_station"

[remote.upgrade]
deadline_ms = 300000
"#,
        )
        .unwrap();
        let args = DeviceArgs {
            host: Some("192.168.0.1".into()),
            ..DeviceArgs::default()
        };
        let merged = config.merge_with_args(&args, false);
        assert_eq!(merged.host.as_deref(), Some("192.168.0.1"));
        assert_eq!(merged.password, "secret");
        assert_eq!(merged.username, "root");
        assert_eq!(merged.port, 22);
        assert_eq!(merged.kind, DeviceKind::GroundStation);
        assert_eq!(merged.remote.upgrade.deadline_ms, 300_000);
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let merged = Config::default().merge_with_args(&DeviceArgs::default(), false);
        assert!(merged.target().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"10.0.0.5\"\nno_color = true\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        let merged = config.merge_with_args(&DeviceArgs::default(), false);
        assert!(merged.no_color);
        assert_eq!(merged.target().unwrap().address(), "10.0.0.5:22");
    }
}
