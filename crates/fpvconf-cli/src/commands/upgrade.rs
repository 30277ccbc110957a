//! Upgrade command - flash kernel and rootfs with live progress

use anyhow::{anyhow, Context, Result};
use fpvconf_core::{DeviceTarget, ProgressEvent, SessionOutcome};
use fpvconf_remote::{
    CancellationToken, FirmwareImages, FirmwareUpgrade, RemoteTransport, UpgradeConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::output::OutputContext;

/// Stage images, run sysupgrade and follow it to the end
pub async fn upgrade(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    images: &FirmwareImages,
    config: &UpgradeConfig,
    deadline: Option<Duration>,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!(
        "Upgrading {} with {} and {}",
        target.host,
        images.kernel.display(),
        images.rootfs.display()
    ));

    // Ctrl+C cancels the monitor instead of killing the process
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl+C handler")?;

    let pb = if ctx.quiet || ctx.is_json() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut sink = |event: &ProgressEvent| {
        pb.set_position(u64::from(event.percent));
        pb.set_message(format!("{}: {}", event.stage, event.line));
    };

    let upgrade = FirmwareUpgrade::new(transport.clone(), config.clone());
    let report = upgrade
        .run(target, images, deadline, &cancel, &mut sink)
        .await
        .context("Failed to stage firmware images")?;

    match report.outcome() {
        SessionOutcome::Success(_) => pb.finish_with_message("Complete!"),
        SessionOutcome::Cancelled => pb.abandon_with_message("Cancelled"),
        SessionOutcome::Timeout => pb.abandon_with_message("Timed out"),
        SessionOutcome::Failure(ref reason) => pb.abandon_with_message(reason.clone()),
    }
    ctx.print_value(&report, || {});

    match report.outcome() {
        SessionOutcome::Success(_) => {
            ctx.success("\nFirmware upgrade completed, device is rebooting");
            Ok(())
        }
        SessionOutcome::Cancelled => Err(anyhow!(
            "Upgrade cancelled at {}%; the device may need a recovery flash",
            report.percent
        )),
        SessionOutcome::Timeout => Err(anyhow!(
            "Upgrade did not finish in time (last progress {}%)",
            report.percent
        )),
        SessionOutcome::Failure(reason) => Err(anyhow!("Upgrade failed: {}", reason)),
    }
}
