//! SSH connector backed by russh
//!
//! Devices ship with throwaway host keys that change on every reflash, so
//! host keys are accepted without verification. Only password auth is used.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fpvconf_core::DeviceTarget;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tracing::{debug, instrument, warn};

use super::scp::{self, FileHeader};
use super::{CommandOutput, Connector, RemoteSession, ShellChannel, ShellRead};
use crate::config::SshConfig;
use crate::error::TransportError;

/// Client handler that trusts any host key
struct DeviceHandler;

#[async_trait]
impl client::Handler for DeviceHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn channel_error(err: russh::Error) -> TransportError {
    match err {
        russh::Error::Disconnect | russh::Error::HUP => TransportError::ConnectionClosed,
        other => TransportError::Protocol(other.to_string()),
    }
}

/// Connector opening one russh session per call
pub struct SshConnector {
    config: Arc<client::Config>,
    pty_cols: u32,
    pty_rows: u32,
}

impl SshConnector {
    pub fn new(ssh: &SshConfig) -> Self {
        let keepalive = (ssh.keepalive_secs > 0).then(|| Duration::from_secs(ssh.keepalive_secs));
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(ssh.inactivity_secs)),
            keepalive_interval: keepalive,
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
            pty_cols: ssh.pty_cols,
            pty_rows: ssh.pty_rows,
        }
    }

    #[instrument(skip(self, target), fields(host = %target.host, port = target.port))]
    async fn handshake(&self, target: &DeviceTarget) -> Result<Handle<DeviceHandler>, TransportError> {
        let mut handle = client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            DeviceHandler,
        )
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", target.address(), e)))?;

        let accepted = handle
            .authenticate_password(target.username.clone(), target.password.clone())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if !accepted {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            return Err(TransportError::AuthenticationFailed {
                user: target.username.clone(),
                host: target.host.clone(),
            });
        }
        debug!("SSH session established");
        Ok(handle)
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(&SshConfig::default())
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn RemoteSession>, TransportError> {
        let handle = self.handshake(target).await?;
        Ok(Box::new(SshSession { handle }))
    }

    async fn open_shell(
        &self,
        target: &DeviceTarget,
    ) -> Result<Box<dyn ShellChannel>, TransportError> {
        let handle = self.handshake(target).await?;
        let channel = handle.channel_open_session().await.map_err(channel_error)?;
        channel
            .request_pty(false, "xterm", self.pty_cols, self.pty_rows, 0, 0, &[])
            .await
            .map_err(channel_error)?;
        channel.request_shell(true).await.map_err(channel_error)?;
        Ok(Box::new(SshShell {
            handle,
            channel,
            closed: false,
        }))
    }
}

struct SshSession {
    handle: Handle<DeviceHandler>,
}

impl SshSession {
    async fn exec_channel(&self, command: &str) -> Result<ScpStream, TransportError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;
        Ok(ScpStream {
            channel,
            buf: Vec::new(),
            exit_status: None,
            eof: false,
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    #[instrument(skip(self))]
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;

        let mut output = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        debug!(?exit_status, bytes = output.len(), "Command finished");
        Ok(CommandOutput {
            exit_status,
            output: String::from_utf8_lossy(&output).into_owned(),
        })
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload(&mut self, remote_path: &str, data: &[u8], mode: u32) -> Result<(), TransportError> {
        let mut stream = self.exec_channel(&scp::sink_command(remote_path)).await?;
        stream.reply().await?;

        let header = FileHeader::new(mode, data.len() as u64, scp::file_name(remote_path));
        stream.send(&header.encode()).await?;
        stream.reply().await?;

        stream.send(data).await?;
        stream.send(&[scp::OK]).await?;
        stream.reply().await?;
        stream.finish().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download(&mut self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.exec_channel(&scp::source_command(remote_path)).await?;
        stream.send(&[scp::OK]).await?;

        let header = stream.header().await?;
        debug!(size = header.size, name = %header.name, "Receiving file");
        stream.send(&[scp::OK]).await?;

        let size = usize::try_from(header.size)
            .map_err(|_| TransportError::TransferFailed("file too large".into()))?;
        let data = stream.exact(size).await?;
        stream.reply().await?;
        stream.send(&[scp::OK]).await?;
        stream.finish().await?;
        Ok(data)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(channel_error)
    }
}

/// Byte stream over an exec channel for the SCP framing
struct ScpStream {
    channel: Channel<Msg>,
    buf: Vec<u8>,
    exit_status: Option<u32>,
    eof: bool,
}

impl ScpStream {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.channel.data(data).await.map_err(channel_error)
    }

    /// Pull the next chunk into the buffer
    async fn fill(&mut self) -> Result<(), TransportError> {
        loop {
            if self.eof {
                return Err(TransportError::TransferFailed(format!(
                    "remote scp ended early (exit status {:?})",
                    self.exit_status
                )));
            }
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => {
                    self.buf.extend_from_slice(data);
                    return Ok(());
                }
                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    warn!("scp: {}", String::from_utf8_lossy(data).trim_end());
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => self.exit_status = Some(exit_status),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => self.eof = true,
                Some(_) => {}
            }
        }
    }

    async fn reply(&mut self) -> Result<(), TransportError> {
        loop {
            if let Some(reply) = scp::take_reply(&mut self.buf) {
                return reply?.into_result();
            }
            self.fill().await?;
        }
    }

    async fn header(&mut self) -> Result<FileHeader, TransportError> {
        loop {
            if let Some(header) = scp::take_source_header(&mut self.buf) {
                return header;
            }
            self.fill().await?;
        }
    }

    async fn exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(data) = scp::take_exact(&mut self.buf, n) {
                return Ok(data);
            }
            self.fill().await?;
        }
    }

    /// Signal end of input and wait for the remote scp to exit
    async fn finish(mut self) -> Result<(), TransportError> {
        self.channel.eof().await.map_err(channel_error)?;
        while !self.eof {
            match self.channel.wait().await {
                Some(ChannelMsg::ExitStatus { exit_status }) => self.exit_status = Some(exit_status),
                Some(ChannelMsg::Close) | None => self.eof = true,
                Some(_) => {}
            }
        }
        match self.exit_status {
            Some(0) | None => Ok(()),
            Some(status) => Err(TransportError::TransferFailed(format!(
                "remote scp exited with status {}",
                status
            ))),
        }
    }
}

struct SshShell {
    handle: Handle<DeviceHandler>,
    channel: Channel<Msg>,
    closed: bool,
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.channel.data(data).await.map_err(channel_error)
    }

    async fn read(&mut self, wait: Duration) -> Result<ShellRead, TransportError> {
        if self.closed {
            return Ok(ShellRead::Closed);
        }
        let Ok(msg) = tokio::time::timeout(wait, self.channel.wait()).await else {
            return Ok(ShellRead::Idle);
        };
        Ok(match msg {
            Some(ChannelMsg::Data { ref data }) => ShellRead::Data(data.to_vec()),
            Some(ChannelMsg::ExtendedData { ref data, .. }) => ShellRead::Data(data.to_vec()),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                self.closed = true;
                ShellRead::Closed
            }
            Some(_) => ShellRead::Idle,
        })
    }

    fn is_connected(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn close(&mut self) {
        self.closed = true;
        if let Err(e) = self.channel.close().await {
            debug!("Shell channel close: {}", e);
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("SSH disconnect: {}", e);
        }
    }
}
