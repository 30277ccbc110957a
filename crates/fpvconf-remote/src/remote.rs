//! Remote command execution and file transfer
//!
//! Every operation opens its own session, does its work and closes the
//! session again, whatever the outcome. Nothing is cached between calls and
//! nothing is retried.
//!
//! Calls against the same device may run concurrently. They are not
//! serialised here, so two writers racing on one file end with whichever
//! copy finished last.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fpvconf_core::commands::{list_dir, mkdir_p};
use fpvconf_core::{DeviceTarget, ProgressEvent, ProgressSink};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::{RemoteConfig, TimeoutsConfig};
use crate::error::{TransportError, TransportResult};
use crate::transport::{CommandOutput, Connector, RemoteSession, SshConnector};

/// Default permission bits for uploaded files
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Stage labels of transfer progress events
pub const UPLOAD: &str = "upload";
pub const DOWNLOAD: &str = "download";

/// Stateless front end over a [`Connector`]
#[derive(Clone)]
pub struct RemoteTransport {
    connector: Arc<dyn Connector>,
    timeouts: TimeoutsConfig,
}

impl RemoteTransport {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            timeouts: TimeoutsConfig::default(),
        }
    }

    pub fn with_timeouts(connector: Arc<dyn Connector>, timeouts: TimeoutsConfig) -> Self {
        Self {
            connector,
            timeouts,
        }
    }

    /// Transport over real SSH using the given configuration
    pub fn ssh(config: &RemoteConfig) -> Self {
        Self::with_timeouts(
            Arc::new(SshConnector::new(&config.ssh)),
            config.timeouts.clone(),
        )
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.timeouts
    }

    /// Open a session, giving up after the connect timeout or `limit`,
    /// whichever is shorter
    async fn open(
        &self,
        target: &DeviceTarget,
        limit: Option<Duration>,
    ) -> TransportResult<Box<dyn RemoteSession>> {
        let connect = self.timeouts.connect();
        let limit = limit.map_or(connect, |l| l.min(connect));
        match tokio::time::timeout(limit, self.connector.connect(target)).await {
            Ok(session) => session,
            Err(_) => Err(TransportError::Timeout(format!(
                "connecting to {} took longer than {:?}",
                target.address(),
                limit
            ))),
        }
    }

    /// Run `op` on a fresh session and close it afterwards, also on
    /// failure or when `limit` elapses
    ///
    /// `limit` covers opening the session as well as the work itself.
    async fn with_session<T, F>(
        &self,
        target: &DeviceTarget,
        what: &str,
        limit: Option<Duration>,
        op: F,
    ) -> TransportResult<T>
    where
        F: for<'s> FnOnce(
            &'s mut dyn RemoteSession,
        ) -> futures::future::BoxFuture<'s, TransportResult<T>>,
    {
        let started = Instant::now();
        let mut session = self.open(target, limit).await?;
        let result = match limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, op(session.as_mut())).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(format!(
                        "{} exceeded {:?}",
                        what, limit
                    ))),
                }
            }
            None => op(session.as_mut()).await,
        };
        if let Err(e) = session.close().await {
            debug!("Closing session after {}: {}", what, e);
        }
        result
    }

    /// Run a command and capture its combined output
    ///
    /// A non-zero exit status is returned as data, not as an error. The
    /// timeout, when given, includes connecting.
    #[instrument(skip(self, target), fields(host = %target.host))]
    pub async fn run_command(
        &self,
        target: &DeviceTarget,
        command: &str,
        timeout: Option<Duration>,
    ) -> TransportResult<CommandOutput> {
        let cmd = command.to_string();
        let output = self
            .with_session(target, "command", timeout, move |s| {
                Box::pin(async move { s.exec(&cmd).await })
            })
            .await?;
        debug!(status = ?output.exit_status, "Command returned");
        Ok(output)
    }

    async fn put(&self, target: &DeviceTarget, data: Vec<u8>, remote_path: &str) -> TransportResult<()> {
        let path = remote_path.to_string();
        let limit = Some(self.timeouts.transfer());
        self.with_session(target, "upload", limit, move |s| {
            Box::pin(async move { s.upload(&path, &data, DEFAULT_FILE_MODE).await })
        })
        .await
    }

    async fn fetch(&self, target: &DeviceTarget, remote_path: &str) -> TransportResult<Vec<u8>> {
        let path = remote_path.to_string();
        let limit = Some(self.timeouts.transfer());
        self.with_session(target, "download", limit, move |s| {
            Box::pin(async move { s.download(&path).await })
        })
        .await
    }

    /// Upload an in-memory buffer
    #[instrument(skip(self, target, data, sink), fields(host = %target.host, size = data.len()))]
    pub async fn upload_bytes(
        &self,
        target: &DeviceTarget,
        data: &[u8],
        remote_path: &str,
        sink: &mut dyn ProgressSink,
    ) -> TransportResult<()> {
        sink.emit(&ProgressEvent::new(
            UPLOAD,
            0,
            format!("{} ({} bytes)", remote_path, data.len()),
        ));
        self.put(target, data.to_vec(), remote_path).await?;
        sink.emit(&ProgressEvent::new(UPLOAD, 100, remote_path));
        info!("Uploaded {}", remote_path);
        Ok(())
    }

    /// Upload a local file
    pub async fn upload_file(
        &self,
        target: &DeviceTarget,
        local_path: &Path,
        remote_path: &str,
        sink: &mut dyn ProgressSink,
    ) -> TransportResult<()> {
        if !local_path.is_file() {
            return Err(TransportError::NotFound(local_path.display().to_string()));
        }
        let data = tokio::fs::read(local_path).await?;
        self.upload_bytes(target, &data, remote_path, sink).await
    }

    /// Upload text by staging it in a local temporary file first
    pub async fn upload_text(
        &self,
        target: &DeviceTarget,
        text: &str,
        remote_path: &str,
    ) -> TransportResult<()> {
        let staged = tempfile::NamedTempFile::new()?;
        tokio::fs::write(staged.path(), text.as_bytes()).await?;
        self.upload_file(target, staged.path(), remote_path, &mut |_: &ProgressEvent| {})
            .await
    }

    /// Download a remote file into memory
    #[instrument(skip(self, target, sink), fields(host = %target.host))]
    pub async fn download_file(
        &self,
        target: &DeviceTarget,
        remote_path: &str,
        sink: &mut dyn ProgressSink,
    ) -> TransportResult<Vec<u8>> {
        sink.emit(&ProgressEvent::new(DOWNLOAD, 0, remote_path));
        let data = self.fetch(target, remote_path).await?;
        sink.emit(&ProgressEvent::new(
            DOWNLOAD,
            100,
            format!("{} ({} bytes)", remote_path, data.len()),
        ));
        debug!(size = data.len(), "Downloaded");
        Ok(data)
    }

    /// Download a remote file to `local_path`, creating parent directories
    pub async fn download_to(
        &self,
        target: &DeviceTarget,
        remote_path: &str,
        local_path: &Path,
        sink: &mut dyn ProgressSink,
    ) -> TransportResult<()> {
        let data = self.download_file(target, remote_path, sink).await?;
        write_local(local_path, data).await
    }

    /// Mirror a local directory tree under `remote_dir`
    ///
    /// One progress event per copied file. Returns the number of files
    /// copied.
    #[instrument(skip(self, target, sink), fields(host = %target.host))]
    pub async fn upload_directory(
        &self,
        target: &DeviceTarget,
        local_dir: &Path,
        remote_dir: &str,
        sink: &mut dyn ProgressSink,
    ) -> TransportResult<usize> {
        if !local_dir.is_dir() {
            return Err(TransportError::NotFound(local_dir.display().to_string()));
        }
        let remote_dir = normalize_dir(remote_dir);
        let mut dirs = vec![remote_dir.to_string()];
        let mut files = Vec::new();
        for entry in WalkDir::new(local_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| TransportError::Io(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(local_dir)
                .map_err(|e| TransportError::Io(e.to_string()))?;
            let remote_path = join_remote(remote_dir, relative);

            if entry.file_type().is_dir() {
                dirs.push(remote_path);
            } else if entry.file_type().is_file() {
                files.push((entry.into_path(), remote_path));
            } else {
                warn!("Skipping {}: not a regular file", entry.path().display());
            }
        }

        for dir in &dirs {
            self.run_checked(target, &mkdir_p(dir)).await?;
        }
        let total = files.len();
        sink.emit(&ProgressEvent::new(
            UPLOAD,
            0,
            format!("{} files to {}", total, remote_dir),
        ));
        for (copied, (local, remote_path)) in files.iter().enumerate() {
            let data = tokio::fs::read(local).await?;
            self.put(target, data, remote_path).await?;
            sink.emit(&ProgressEvent::new(
                UPLOAD,
                percent(copied + 1, total),
                remote_path.as_str(),
            ));
        }
        info!("Uploaded {} files to {}", total, remote_dir);
        Ok(total)
    }

    /// Mirror a remote directory tree into `local_dir`
    ///
    /// The tree is discovered with `ls -1p`, where directories carry a
    /// trailing `/`, before any file is copied. One progress event per
    /// copied file. Returns the number of files copied.
    #[instrument(skip(self, target, sink), fields(host = %target.host))]
    pub async fn download_directory(
        &self,
        target: &DeviceTarget,
        remote_dir: &str,
        local_dir: &Path,
        sink: &mut dyn ProgressSink,
    ) -> TransportResult<usize> {
        let remote_dir = normalize_dir(remote_dir);
        let mut pending: Vec<(String, PathBuf)> =
            vec![(remote_dir.to_string(), local_dir.to_path_buf())];
        let mut files = Vec::new();

        while let Some((remote, local)) = pending.pop() {
            tokio::fs::create_dir_all(&local).await?;
            let listing = self
                .run_command(target, &list_dir(&remote), Some(self.timeouts.transfer()))
                .await?;
            if !listing.success() {
                return Err(TransportError::NotFound(format!(
                    "{}: {}",
                    remote,
                    listing.output.trim()
                )));
            }

            for entry in parse_listing(&listing.output) {
                match entry {
                    ListingEntry::Dir(name) => {
                        pending.push((child_path(&remote, name), local.join(name)));
                    }
                    ListingEntry::File(name) => {
                        files.push((child_path(&remote, name), local.join(name)));
                    }
                }
            }
        }

        let total = files.len();
        sink.emit(&ProgressEvent::new(
            DOWNLOAD,
            0,
            format!("{} files from {}", total, remote_dir),
        ));
        for (copied, (remote_path, local)) in files.iter().enumerate() {
            let data = self.fetch(target, remote_path).await?;
            write_local(local, data).await?;
            sink.emit(&ProgressEvent::new(
                DOWNLOAD,
                percent(copied + 1, total),
                remote_path.as_str(),
            ));
        }
        info!("Downloaded {} files from {}", total, remote_dir);
        Ok(total)
    }

    async fn run_checked(&self, target: &DeviceTarget, command: &str) -> TransportResult<()> {
        let output = self
            .run_command(target, command, Some(self.timeouts.command()))
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::TransferFailed(format!(
                "'{}' failed: {}",
                command,
                output.output.trim()
            )))
        }
    }
}

async fn write_local(local_path: &Path, data: Vec<u8>) -> TransportResult<()> {
    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(local_path, data).await?;
    Ok(())
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done * 100 / total).unwrap_or(100)
}

/// Drop trailing slashes, keeping `/` itself
fn normalize_dir(dir: &str) -> &str {
    match dir.trim_end_matches('/') {
        "" if dir.starts_with('/') => "/",
        trimmed => trimmed,
    }
}

fn child_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// One line of `ls -1p` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry<'a> {
    Dir(&'a str),
    File(&'a str),
}

/// Split `ls -1p` output into files and directories
pub fn parse_listing(output: &str) -> Vec<ListingEntry<'_>> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && *line != "./" && *line != "../")
        .map(|line| match line.strip_suffix('/') {
            Some(dir) => ListingEntry::Dir(dir),
            None => ListingEntry::File(line),
        })
        .collect()
}

fn join_remote(base: &str, relative: &Path) -> String {
    relative.components().fold(base.to_string(), |dir, part| {
        let name = part.as_os_str().to_string_lossy();
        if dir.is_empty() {
            name.into_owned()
        } else {
            child_path(&dir, &name)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let entries = parse_listing("fonts/\nwfb.conf\r\n\n./\nvtx_info.yaml\n");
        assert_eq!(
            entries,
            vec![
                ListingEntry::Dir("fonts"),
                ListingEntry::File("wfb.conf"),
                ListingEntry::File("vtx_info.yaml"),
            ]
        );
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(
            join_remote("/usr/share/fonts", Path::new("osd/font.png")),
            "/usr/share/fonts/osd/font.png"
        );
        assert_eq!(join_remote("/", Path::new("etc/wfb.conf")), "/etc/wfb.conf");
        assert_eq!(join_remote("", Path::new("a/b")), "a/b");
    }

    #[test]
    fn test_normalize_dir_keeps_root() {
        assert_eq!(normalize_dir("/"), "/");
        assert_eq!(normalize_dir("//"), "/");
        assert_eq!(normalize_dir("/etc/"), "/etc");
        assert_eq!(normalize_dir("fonts"), "fonts");
        assert_eq!(child_path("/", "etc"), "/etc");
        assert_eq!(child_path("/etc", "wfb.conf"), "/etc/wfb.conf");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
