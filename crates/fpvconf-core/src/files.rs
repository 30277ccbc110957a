//! Catalogue of device configuration files and their dialects

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::DeviceKind;

/// Text dialect of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `key=value` lines with `#` comments
    Flat,
    /// INI style with `[section]` headers
    Sectioned,
    /// `options <module> name=value ...` kernel module line
    DriverOptions,
    /// Nested YAML mapping addressed by dotted paths
    Nested,
}

/// Well-known configuration files on OpenIPC devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFile {
    /// WFB radio link settings
    WfbConf,
    /// Majestic streamer settings
    Majestic,
    /// MAVLink telemetry settings
    Telemetry,
    /// Ground station wifibroadcast settings
    Wifibroadcast,
    /// Wi-Fi driver module options
    WfbModprobe,
}

#[derive(Debug, Error)]
#[error("unknown config file '{0}' (expected one of: wfb, majestic, telemetry, wifibroadcast, driver)")]
pub struct UnknownFile(pub String);

impl RemoteFile {
    pub const ALL: [RemoteFile; 5] = [
        Self::WfbConf,
        Self::Majestic,
        Self::Telemetry,
        Self::Wifibroadcast,
        Self::WfbModprobe,
    ];

    /// Absolute path on the device
    pub fn remote_path(&self) -> &'static str {
        match self {
            Self::WfbConf => "/etc/wfb.conf",
            Self::Majestic => "/etc/majestic.yaml",
            Self::Telemetry => "/etc/telemetry.conf",
            Self::Wifibroadcast => "/etc/wifibroadcast.cfg",
            Self::WfbModprobe => "/etc/modprobe.d/wfb.conf",
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Self::WfbConf | Self::Telemetry => Dialect::Flat,
            Self::Majestic => Dialect::Nested,
            Self::Wifibroadcast => Dialect::Sectioned,
            Self::WfbModprobe => Dialect::DriverOptions,
        }
    }

    /// Device class that carries this file
    pub fn device_kind(&self) -> DeviceKind {
        match self {
            Self::WfbConf | Self::Majestic | Self::Telemetry => DeviceKind::Camera,
            Self::Wifibroadcast | Self::WfbModprobe => DeviceKind::GroundStation,
        }
    }

    /// Short name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::WfbConf => "wfb",
            Self::Majestic => "majestic",
            Self::Telemetry => "telemetry",
            Self::Wifibroadcast => "wifibroadcast",
            Self::WfbModprobe => "driver",
        }
    }

    /// Look up a file by its remote path
    pub fn from_remote_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.remote_path() == path)
    }
}

impl FromStr for RemoteFile {
    type Err = UnknownFile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == lower || f.remote_path() == s)
            .ok_or(UnknownFile(s.to_string()))
    }
}

impl fmt::Display for RemoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_and_path() {
        assert_eq!("wfb".parse::<RemoteFile>().unwrap(), RemoteFile::WfbConf);
        assert_eq!(
            "/etc/majestic.yaml".parse::<RemoteFile>().unwrap(),
            RemoteFile::Majestic
        );
        assert!("/etc/passwd".parse::<RemoteFile>().is_err());
    }

    #[test]
    fn test_dialects() {
        assert_eq!(RemoteFile::WfbConf.dialect(), Dialect::Flat);
        assert_eq!(RemoteFile::Wifibroadcast.dialect(), Dialect::Sectioned);
        assert_eq!(RemoteFile::WfbModprobe.dialect(), Dialect::DriverOptions);
        assert_eq!(RemoteFile::Majestic.dialect(), Dialect::Nested);
    }

    #[test]
    fn test_from_remote_path() {
        assert_eq!(
            RemoteFile::from_remote_path("/etc/modprobe.d/wfb.conf"),
            Some(RemoteFile::WfbModprobe)
        );
        assert_eq!(RemoteFile::from_remote_path("/etc/hosts"), None);
    }
}
