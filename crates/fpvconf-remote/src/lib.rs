//! fpvconf-remote - Talking to OpenIPC devices over SSH
//!
//! - [`RemoteTransport`]: one-shot commands, file copies and directory
//!   mirroring, one session per call
//! - [`UpgradeMonitor`]: cancellable state machine that follows a
//!   `sysupgrade` run through its output
//! - [`FirmwareUpgrade`]: stages images and drives the monitor
//! - [`scan`]: find devices on a local network
//!
//! The device is always passed in as a [`DeviceTarget`](fpvconf_core::DeviceTarget);
//! nothing here keeps a "current device".
//!
//! # Example
//!
//! ```ignore
//! use fpvconf_remote::{RemoteConfig, RemoteTransport};
//! use fpvconf_core::{DeviceKind, DeviceTarget, RemoteFile};
//!
//! let transport = RemoteTransport::ssh(&RemoteConfig::default());
//! let target = DeviceTarget::new("192.168.1.10", 22, "root", "12345", DeviceKind::Camera);
//! let wfb = transport.read_config(&target, RemoteFile::WfbConf).await?;
//! println!("channel = {:?}", wfb.map.get("channel"));
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod milestone;
pub mod monitor;
pub mod remote;
pub mod scan;
pub mod transport;
pub mod upgrade;

pub use config::{ConfigError, RemoteConfig, ScanConfig, SshConfig, TimeoutsConfig, UpgradeConfig};
pub use device::LoadedConfig;
pub use error::{DeviceError, DeviceResult, MonitorError, TransportError, TransportResult};
pub use milestone::{Milestone, MilestoneTable, ProgressTracker};
pub use monitor::{MonitorReport, MonitorState, UpgradeMonitor};
pub use remote::{RemoteTransport, DEFAULT_FILE_MODE, DOWNLOAD, UPLOAD};
pub use transport::{
    CommandOutput, Connector, MockConnector, RemoteSession, ScriptStep, ShellChannel, ShellRead,
    SshConnector,
};
pub use upgrade::{FirmwareImages, FirmwareUpgrade};

pub use tokio_util::sync::CancellationToken;
