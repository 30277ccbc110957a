//! Transport seams for talking to a device
//!
//! - [`Connector`] opens sessions for a [`DeviceTarget`]
//! - [`RemoteSession`] runs one command or one file copy at a time
//! - [`ShellChannel`] is an interactive shell used by the upgrade monitor
//!
//! [`ssh::SshConnector`] is the real implementation; [`mock::MockConnector`]
//! backs the tests and the CLI's dry-run mode.

pub mod mock;
pub mod scp;
pub mod ssh;

use std::time::Duration;

use async_trait::async_trait;
use fpvconf_core::DeviceTarget;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use mock::{MockConnector, ScriptStep};
pub use ssh::SshConnector;

/// Exit status and combined stdout/stderr of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// `None` when the channel closed without reporting a status
    pub exit_status: Option<u32>,
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_status: u32, output: impl Into<String>) -> Self {
        Self {
            exit_status: Some(exit_status),
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Result of one bounded read from a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellRead {
    Data(Vec<u8>),
    /// Nothing arrived within the wait
    Idle,
    /// The remote side ended the shell
    Closed,
}

/// Opens sessions against a device
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a session for commands and file copies
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn RemoteSession>, TransportError>;

    /// Open an authenticated interactive shell with a PTY
    async fn open_shell(&self, target: &DeviceTarget)
        -> Result<Box<dyn ShellChannel>, TransportError>;
}

/// One authenticated connection; never shared between operations
#[async_trait]
pub trait RemoteSession: Send {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Write `data` to `remote_path` with the given permission bits
    async fn upload(&mut self, remote_path: &str, data: &[u8], mode: u32)
        -> Result<(), TransportError>;

    async fn download(&mut self, remote_path: &str) -> Result<Vec<u8>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Interactive shell used to stream output of long-running commands
#[async_trait]
pub trait ShellChannel: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `wait` for output
    async fn read(&mut self, wait: Duration) -> Result<ShellRead, TransportError>;

    /// Whether the underlying connection is still up
    fn is_connected(&self) -> bool;

    async fn close(&mut self);
}
