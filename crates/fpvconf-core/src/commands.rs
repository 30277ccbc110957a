//! Shell commands understood by OpenIPC firmware
//!
//! These strings are a compatibility surface with the device's own shell
//! and init scripts. They are sent verbatim.

use serde::{Deserialize, Serialize};

/// Query the short host name
pub const HOSTNAME: &str = "hostname -s";

/// Reboot the device
pub const REBOOT: &str = "reboot";

/// Print the firmware release information
pub const FIRMWARE_VERSION: &str = "cat /etc/os-release";

/// Generate a new WFB key pair and install the drone key
pub const KEYGEN: &str = "cd /tmp && wfb_keygen && cp /tmp/drone.key /etc/drone.key";

/// Where the console getty line lives
pub const INITTAB: &str = "/etc/inittab";

/// Services that can be restarted after a config push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// WFB link on the camera
    Wfb,
    /// Majestic streamer
    Majestic,
    /// MAVLink telemetry bridge
    Telemetry,
    /// wifibroadcast on a ground station
    GroundStationWfb,
}

impl Service {
    pub fn restart_command(&self) -> &'static str {
        match self {
            Self::Wfb => {
                "(wifibroadcast stop; wifibroadcast stop; sleep 1; wifibroadcast start) >/dev/null 2>&1 &"
            }
            Self::Majestic => "killall -1 majestic",
            Self::Telemetry => "(telemetry stop; sleep 1; telemetry start) >/dev/null 2>&1 &",
            Self::GroundStationWfb => "systemctl restart wifibroadcast@gs",
        }
    }
}

impl std::str::FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wfb" => Ok(Self::Wfb),
            "majestic" => Ok(Self::Majestic),
            "telemetry" => Ok(Self::Telemetry),
            "gs" | "gs-wfb" | "wifibroadcast" => Ok(Self::GroundStationWfb),
            other => Err(format!("unknown service: {}", other)),
        }
    }
}

/// Toggle the serial console getty in `/etc/inittab`.
///
/// With the console disabled, UART0 is free for MAVLink telemetry.
pub fn console_on_uart(enabled: bool) -> String {
    if enabled {
        format!("sed -i 's/^#console::respawn/console::respawn/' {}", INITTAB)
    } else {
        format!("sed -i 's/^console::respawn/#console::respawn/' {}", INITTAB)
    }
}

/// Firmware upgrade from already-uploaded kernel and rootfs images
pub fn sysupgrade(kernel_path: &str, rootfs_path: &str) -> String {
    format!("sysupgrade --kernel={} --rootfs={} -n", kernel_path, rootfs_path)
}

/// One entry per line, directories marked with a trailing `/`
pub fn list_dir(path: &str) -> String {
    format!("ls -1p {}", shell_quote(path))
}

pub fn mkdir_p(path: &str) -> String {
    format!("mkdir -p {}", shell_quote(path))
}

/// Single-quote a path for the remote POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysupgrade_is_verbatim() {
        assert_eq!(
            sysupgrade("/tmp/uImage.ssc338q", "/tmp/rootfs.squashfs.ssc338q"),
            "sysupgrade --kernel=/tmp/uImage.ssc338q --rootfs=/tmp/rootfs.squashfs.ssc338q -n"
        );
    }

    #[test]
    fn test_console_toggle() {
        assert!(console_on_uart(false).contains("s/^console::respawn/#console::respawn/"));
        assert!(console_on_uart(true).contains("s/^#console::respawn/console::respawn/"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/wfb.conf"), "'/etc/wfb.conf'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(list_dir("/usr/share/fonts"), "ls -1p '/usr/share/fonts'");
    }

    #[test]
    fn test_service_parse() {
        assert_eq!("majestic".parse::<Service>().unwrap(), Service::Majestic);
        assert_eq!(
            Service::Majestic.restart_command(),
            "killall -1 majestic"
        );
        assert!("ntp".parse::<Service>().is_err());
    }
}
