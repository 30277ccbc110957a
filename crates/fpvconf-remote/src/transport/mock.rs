//! Mock connector for testing and dry runs
//!
//! Holds an in-memory remote filesystem, scripted command replies and a
//! scripted interactive shell. All state is behind one `Arc`, so a test
//! keeps a clone of the connector to inspect what the code under test did.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fpvconf_core::DeviceTarget;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{CommandOutput, Connector, RemoteSession, ShellChannel, ShellRead};
use crate::error::TransportError;

/// One step of scripted shell output, played after the previous step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Emit `text` followed by a newline
    Line { delay: Duration, text: String },
    /// Emit raw bytes without adding a newline
    Raw { delay: Duration, data: Vec<u8> },
    /// Drop the connection
    Disconnect { delay: Duration },
    /// End the shell cleanly (EOF) while the connection stays up
    Close { delay: Duration },
}

impl ScriptStep {
    pub fn line(delay_ms: u64, text: impl Into<String>) -> Self {
        Self::Line {
            delay: Duration::from_millis(delay_ms),
            text: text.into(),
        }
    }

    fn delay(&self) -> Duration {
        match self {
            Self::Line { delay, .. }
            | Self::Raw { delay, .. }
            | Self::Disconnect { delay }
            | Self::Close { delay } => *delay,
        }
    }
}

#[derive(Default)]
struct MockState {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    dirs: RwLock<BTreeSet<String>>,
    replies: RwLock<Vec<(String, CommandOutput)>>,
    executed: RwLock<Vec<String>>,
    shell_script: RwLock<Vec<ScriptStep>>,
    shell_input: RwLock<Vec<u8>>,
    password: RwLock<Option<String>>,
    exec_delay: RwLock<Option<Duration>>,
    connect_delay: RwLock<Option<Duration>>,
    unreachable: AtomicBool,
    link_down: AtomicBool,
    shell_refused: AtomicBool,
    open_sessions: AtomicUsize,
    total_connects: AtomicUsize,
}

/// In-memory stand-in for a device reachable over SSH
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Empty device with `/tmp` and `/etc` present
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state
            .dirs
            .write()
            .extend(["/tmp".to_string(), "/etc".to_string()]);
        mock
    }

    /// Only accept this password
    pub fn with_password(self, password: impl Into<String>) -> Self {
        *self.state.password.write() = Some(password.into());
        self
    }

    /// Store a file on the fake device
    pub fn put_file(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        let path = path.into();
        self.register_parents(&path);
        self.state.files.write().insert(path, data.into());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.files.read().get(path).cloned()
    }

    pub fn file_text(&self, path: &str) -> Option<String> {
        self.file(path)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    pub fn files(&self) -> Vec<String> {
        self.state.files.read().keys().cloned().collect()
    }

    /// Reply to an exact command line
    pub fn on_command(&self, command: impl Into<String>, output: CommandOutput) {
        self.state.replies.write().push((command.into(), output));
    }

    /// Commands executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.read().clone()
    }

    /// Make every exec take this long
    pub fn set_exec_delay(&self, delay: Duration) {
        *self.state.exec_delay.write() = Some(delay);
    }

    /// Make every connect hang this long before the login check
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.write() = Some(delay);
    }

    /// Output played by the next interactive shell once a command is written
    pub fn script_shell(&self, steps: Vec<ScriptStep>) {
        *self.state.shell_script.write() = steps;
    }

    /// Everything written into interactive shells
    pub fn shell_input(&self) -> String {
        String::from_utf8_lossy(&self.state.shell_input.read()).into_owned()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn refuse_shell(&self, refuse: bool) {
        self.state.shell_refused.store(refuse, Ordering::SeqCst);
    }

    /// Drop (or restore) the link under any live shell
    pub fn set_link_down(&self, down: bool) {
        self.state.link_down.store(down, Ordering::SeqCst);
    }

    /// Sessions and shells opened but not yet closed
    pub fn open_sessions(&self) -> usize {
        self.state.open_sessions.load(Ordering::SeqCst)
    }

    pub fn total_connects(&self) -> usize {
        self.state.total_connects.load(Ordering::SeqCst)
    }

    fn register_parents(&self, path: &str) {
        let mut dirs = self.state.dirs.write();
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('/') {
            if parent.is_empty() {
                break;
            }
            dirs.insert(parent.to_string());
            current = parent;
        }
    }

    fn check_login(&self, target: &DeviceTarget) -> Result<(), TransportError> {
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{}: connection refused",
                target.address()
            )));
        }
        if let Some(expected) = self.state.password.read().as_ref() {
            if *expected != target.password {
                return Err(TransportError::AuthenticationFailed {
                    user: target.username.clone(),
                    host: target.host.clone(),
                });
            }
        }
        self.state.total_connects.fetch_add(1, Ordering::SeqCst);
        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// `ls -1p` over the in-memory tree
    fn list(&self, dir: &str) -> CommandOutput {
        let dir = dir.trim_end_matches('/');
        let prefix = format!("{}/", dir);
        let dirs = self.state.dirs.read();
        let files = self.state.files.read();
        if !dirs.contains(dir) && !files.keys().any(|f| f.starts_with(&prefix)) {
            return CommandOutput::new(
                1,
                format!("ls: {}: No such file or directory\n", dir),
            );
        }

        let mut entries = BTreeSet::new();
        let children = dirs
            .iter()
            .map(|d| (d.as_str(), true))
            .chain(files.keys().map(|f| (f.as_str(), false)));
        for (path, is_dir) in children {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => entries.insert(format!("{}/", child)),
                None if is_dir => entries.insert(format!("{}/", rest)),
                None => entries.insert(rest.to_string()),
            };
        }
        let mut out = String::new();
        for entry in entries {
            out.push_str(&entry);
            out.push('\n');
        }
        CommandOutput::new(0, out)
    }

    fn run(&self, command: &str) -> CommandOutput {
        if let Some((_, reply)) = self
            .state
            .replies
            .read()
            .iter()
            .rev()
            .find(|(c, _)| c == command)
        {
            return reply.clone();
        }
        if let Some(path) = command.strip_prefix("ls -1p ") {
            return self.list(&unquote(path));
        }
        if let Some(path) = command.strip_prefix("mkdir -p ") {
            let path = unquote(path);
            self.register_parents(&format!("{}/.", path.trim_end_matches('/')));
            return CommandOutput::new(0, "");
        }
        CommandOutput::new(0, "")
    }
}

/// Undo `shell_quote` for a single quoted argument
fn unquote(arg: &str) -> String {
    let arg = arg.trim();
    match arg.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')) {
        Some(inner) => inner.replace(r"'\''", "'"),
        None => arg.to_string(),
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn RemoteSession>, TransportError> {
        let delay = *self.state.connect_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_login(target)?;
        debug!(host = %target.host, "Mock session opened");
        Ok(Box::new(MockSession {
            device: self.clone(),
            open: true,
        }))
    }

    async fn open_shell(
        &self,
        target: &DeviceTarget,
    ) -> Result<Box<dyn ShellChannel>, TransportError> {
        if self.state.shell_refused.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("shell request refused".into()));
        }
        self.check_login(target)?;
        let script = self.state.shell_script.read().clone();
        Ok(Box::new(MockShell {
            device: self.clone(),
            script: script.into(),
            next_due: None,
            ended: false,
            open: true,
        }))
    }
}

struct MockSession {
    device: MockConnector,
    open: bool,
}

impl MockSession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open && !self.device.state.link_down.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        self.ensure_open()?;
        self.device.state.executed.write().push(command.to_string());
        let delay = *self.device.state.exec_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.device.run(command))
    }

    async fn upload(&mut self, remote_path: &str, data: &[u8], _mode: u32) -> Result<(), TransportError> {
        self.ensure_open()?;
        let parent = remote_path.rsplit_once('/').map_or("", |(p, _)| p);
        if !parent.is_empty() && !self.device.state.dirs.read().contains(parent) {
            return Err(TransportError::TransferFailed(format!(
                "scp: {}: No such file or directory",
                parent
            )));
        }
        self.device
            .state
            .files
            .write()
            .insert(remote_path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&mut self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        self.device.file(remote_path).ok_or_else(|| {
            TransportError::NotFound(format!("scp: {}: No such file or directory", remote_path))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::take(&mut self.open) {
            self.device.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MockShell {
    device: MockConnector,
    script: VecDeque<ScriptStep>,
    /// Set once a command has been written; the script runs from then on
    next_due: Option<Instant>,
    ended: bool,
    open: bool,
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        self.device.state.shell_input.write().extend_from_slice(data);
        if self.next_due.is_none() {
            let first = self.script.front().map(ScriptStep::delay).unwrap_or_default();
            self.next_due = Some(Instant::now() + first);
        }
        Ok(())
    }

    async fn read(&mut self, wait: Duration) -> Result<ShellRead, TransportError> {
        if self.ended {
            return Ok(ShellRead::Closed);
        }
        let deadline = Instant::now() + wait;
        let due = match (self.next_due, self.script.front()) {
            (Some(due), Some(_)) if due <= deadline => due,
            _ => {
                tokio::time::sleep_until(deadline).await;
                return Ok(ShellRead::Idle);
            }
        };
        tokio::time::sleep_until(due).await;

        let Some(step) = self.script.pop_front() else {
            return Ok(ShellRead::Idle);
        };
        let delay = self.script.front().map(ScriptStep::delay).unwrap_or_default();
        self.next_due = Some(due + delay);

        Ok(match step {
            ScriptStep::Line { text, .. } => ShellRead::Data(format!("{}\r\n", text).into_bytes()),
            ScriptStep::Raw { data, .. } => ShellRead::Data(data),
            ScriptStep::Disconnect { .. } => {
                self.device.set_link_down(true);
                ShellRead::Idle
            }
            ScriptStep::Close { .. } => {
                self.ended = true;
                ShellRead::Closed
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.open && !self.device.state.link_down.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        if std::mem::take(&mut self.open) {
            self.device.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
