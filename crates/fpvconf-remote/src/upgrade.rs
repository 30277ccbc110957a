//! Firmware upgrade: stage kernel and rootfs images, then run `sysupgrade`
//! under an [`UpgradeMonitor`]

use std::path::{Path, PathBuf};

use fpvconf_core::commands::sysupgrade;
use fpvconf_core::{DeviceTarget, ProgressSink};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::UpgradeConfig;
use crate::error::MonitorError;
use crate::monitor::{MonitorReport, MonitorState, UpgradeMonitor};
use crate::remote::RemoteTransport;

/// Local firmware images for one upgrade
#[derive(Debug, Clone)]
pub struct FirmwareImages {
    pub kernel: PathBuf,
    pub rootfs: PathBuf,
}

/// Uploads images and drives the monitor
pub struct FirmwareUpgrade {
    transport: RemoteTransport,
    config: UpgradeConfig,
}

impl FirmwareUpgrade {
    pub fn new(transport: RemoteTransport, config: UpgradeConfig) -> Self {
        Self { transport, config }
    }

    /// Remote path an image is staged at
    pub fn staged_path(&self, local: &Path) -> String {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        format!("{}/{}", self.config.staging_dir.trim_end_matches('/'), name)
    }

    async fn stage(
        &self,
        target: &DeviceTarget,
        label: &str,
        local: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<String, MonitorError> {
        let remote = self.staged_path(local);
        info!("Staging {} at {}", label, remote);
        self.transport
            .upload_file(target, local, &remote, sink)
            .await
            .map_err(|source| MonitorError::Staging {
                image: local.display().to_string(),
                source,
            })?;
        Ok(remote)
    }

    /// Stage both images and run the upgrade to a terminal state
    ///
    /// Returns `Err` only when staging fails; every monitor outcome,
    /// including cancellation, is reported through the returned report.
    pub async fn run(
        &self,
        target: &DeviceTarget,
        images: &FirmwareImages,
        deadline: Option<std::time::Duration>,
        cancel: &CancellationToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<MonitorReport, MonitorError> {
        let kernel = self.stage(target, "kernel", &images.kernel, sink).await?;
        if cancel.is_cancelled() {
            return Ok(cancelled_before_start());
        }
        let rootfs = self.stage(target, "rootfs", &images.rootfs, sink).await?;
        if cancel.is_cancelled() {
            return Ok(cancelled_before_start());
        }

        let command = sysupgrade(&kernel, &rootfs);
        info!("Starting upgrade: {}", command);
        let mut monitor = UpgradeMonitor::new(self.transport.connector(), &self.config)
            .with_connect_timeout(self.transport.timeouts().connect());
        if let Some(deadline) = deadline {
            monitor = monitor.with_deadline(deadline);
        }
        Ok(monitor.run(target, &command, cancel, sink).await)
    }
}

fn cancelled_before_start() -> MonitorReport {
    MonitorReport {
        state: MonitorState::Cancelled,
        history: vec![MonitorState::Idle, MonitorState::Cancelled],
        percent: 0,
        lines: 0,
    }
}
