//! Device target addressing

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default SSH port on OpenIPC firmware
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Class of device at the other end of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Air unit (camera running majestic + wfb)
    #[default]
    Camera,
    /// Ground station (Radxa/NVR style receiver)
    GroundStation,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::GroundStation => "ground_station",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" | "cam" | "air" => Ok(Self::Camera),
            "ground_station" | "ground-station" | "gs" | "radxa" => Ok(Self::GroundStation),
            other => Err(format!("unknown device kind: {}", other)),
        }
    }
}

/// Connection target for a single remote operation
///
/// Supplied by the caller for every call; the remote engine never stores
/// or defaults credentials on its own.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    /// Host name or IP address
    pub host: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Device class
    #[serde(default)]
    pub kind: DeviceKind,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl DeviceTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        kind: DeviceKind,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            kind,
        }
    }

    /// `host:port` form used for socket connects and log fields
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Password stays out of logs and panic messages.
impl fmt::Debug for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let target = DeviceTarget::new("192.168.1.10", 22, "root", "12345", DeviceKind::Camera);
        let debug = format!("{:?}", target);
        assert!(debug.contains("192.168.1.10"));
        assert!(!debug.contains("12345"));
    }

    #[test]
    fn test_address() {
        let target = DeviceTarget::new("10.5.0.10", 2222, "root", "pw", DeviceKind::GroundStation);
        assert_eq!(target.address(), "10.5.0.10:2222");
    }

    #[test]
    fn test_device_kind_from_str() {
        assert_eq!("gs".parse::<DeviceKind>().unwrap(), DeviceKind::GroundStation);
        assert_eq!("Camera".parse::<DeviceKind>().unwrap(), DeviceKind::Camera);
        assert!("toaster".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_target_deserialize_defaults() {
        let target: DeviceTarget =
            serde_json::from_str(r#"{"host":"10.0.0.1","username":"root","password":"x"}"#)
                .unwrap();
        assert_eq!(target.port, DEFAULT_SSH_PORT);
        assert_eq!(target.kind, DeviceKind::Camera);
    }
}
