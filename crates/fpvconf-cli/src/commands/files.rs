//! Upload/download commands - file and directory copies

use anyhow::{Context, Result};
use fpvconf_core::{DeviceTarget, ProgressEvent};
use fpvconf_remote::RemoteTransport;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::output::OutputContext;

/// Copy a local file, or a directory tree with `recursive`, to the device
pub async fn upload(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    local: &Path,
    remote: &str,
    recursive: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let pb = transfer_bar(ctx)?;
    let mut sink = |event: &ProgressEvent| {
        pb.set_position(u64::from(event.percent));
        pb.set_message(event.line.clone());
    };
    if recursive {
        let count = transport
            .upload_directory(target, local, remote, &mut sink)
            .await
            .with_context(|| format!("Failed to upload {}", local.display()))?;
        pb.finish_and_clear();
        ctx.success(&format!("Uploaded {} file(s) to {}", count, remote));
    } else {
        transport
            .upload_file(target, local, remote, &mut sink)
            .await
            .with_context(|| format!("Failed to upload {}", local.display()))?;
        pb.finish_and_clear();
        ctx.success(&format!("Uploaded {} to {}", local.display(), remote));
    }
    Ok(())
}

/// Copy a remote file, or a directory tree with `recursive`, from the device
pub async fn download(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    remote: &str,
    local: &Path,
    recursive: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let pb = transfer_bar(ctx)?;
    let mut sink = |event: &ProgressEvent| {
        pb.set_position(u64::from(event.percent));
        pb.set_message(event.line.clone());
    };
    if recursive {
        let count = transport
            .download_directory(target, remote, local, &mut sink)
            .await
            .with_context(|| format!("Failed to download {}", remote))?;
        pb.finish_and_clear();
        ctx.success(&format!("Downloaded {} file(s) to {}", count, local.display()));
    } else {
        transport
            .download_to(target, remote, local, &mut sink)
            .await
            .with_context(|| format!("Failed to download {}", remote))?;
        pb.finish_and_clear();
        ctx.success(&format!("Downloaded {} to {}", remote, local.display()));
    }
    Ok(())
}

fn transfer_bar(ctx: &OutputContext) -> Result<ProgressBar> {
    let pb = if ctx.quiet || ctx.is_json() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}% {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}
