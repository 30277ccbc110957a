//! Device-level operations built on [`RemoteTransport`]
//!
//! Reading and writing the configuration files in the
//! [`RemoteFile`] catalogue, plus the fixed maintenance commands.

use fpvconf_codec::{codec_for, ConfigMap, RawConfigDocument};
use fpvconf_core::commands::{self, Service};
use fpvconf_core::{DeviceTarget, ProgressEvent, RemoteFile};
use tracing::{debug, info, instrument};

use crate::error::{DeviceError, DeviceResult, TransportError};
use crate::remote::RemoteTransport;
use crate::transport::CommandOutput;

/// A configuration file as read from the device
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub file: RemoteFile,
    pub text: String,
    pub map: ConfigMap,
    pub doc: RawConfigDocument,
}

impl LoadedConfig {
    fn parse(file: RemoteFile, text: String) -> DeviceResult<Self> {
        let (map, doc) = codec_for(file.dialect())
            .parse(&text)
            .map_err(|source| DeviceError::Codec {
                file: file.remote_path().to_string(),
                source,
            })?;
        Ok(Self {
            file,
            text,
            map,
            doc,
        })
    }
}

impl RemoteTransport {
    /// Download and parse one catalogue file
    #[instrument(skip(self, target), fields(host = %target.host))]
    pub async fn read_config(
        &self,
        target: &DeviceTarget,
        file: RemoteFile,
    ) -> DeviceResult<LoadedConfig> {
        let data = self
            .download_file(target, file.remote_path(), &mut |_: &ProgressEvent| {})
            .await?;
        let text = String::from_utf8(data)
            .map_err(|_| DeviceError::NotText(file.remote_path().to_string()))?;
        LoadedConfig::parse(file, text)
    }

    /// Apply `updates` to a catalogue file and upload the result
    ///
    /// The file is re-read first so edits made on the device since the last
    /// read are kept. Nothing is uploaded when the text does not change.
    #[instrument(skip(self, target, updates), fields(host = %target.host))]
    pub async fn write_config(
        &self,
        target: &DeviceTarget,
        file: RemoteFile,
        updates: &ConfigMap,
    ) -> DeviceResult<LoadedConfig> {
        let current = self.read_config(target, file).await?;
        self.apply_config(target, &current, updates).await
    }

    /// Apply `updates` on top of an already loaded copy and upload the
    /// result, without reading the file again
    #[instrument(skip(self, target, current, updates), fields(host = %target.host, file = %current.file))]
    pub async fn apply_config(
        &self,
        target: &DeviceTarget,
        current: &LoadedConfig,
        updates: &ConfigMap,
    ) -> DeviceResult<LoadedConfig> {
        let file = current.file;
        let text = codec_for(file.dialect())
            .serialize(&current.doc, updates)
            .map_err(|source| DeviceError::Codec {
                file: file.remote_path().to_string(),
                source,
            })?;
        if text == current.text {
            debug!("No changes for {}", file);
            return Ok(current.clone());
        }
        self.upload_text(target, &text, file.remote_path()).await?;
        info!("Updated {} ({} keys)", file, updates.len());
        LoadedConfig::parse(file, text)
    }

    async fn checked(&self, target: &DeviceTarget, command: &str) -> DeviceResult<CommandOutput> {
        let output = self
            .run_command(target, command, Some(self.timeouts().command()))
            .await?;
        match output.exit_status {
            Some(0) => Ok(output),
            Some(status) => Err(DeviceError::CommandFailed {
                command: command.to_string(),
                status,
                output: output.output.trim().to_string(),
            }),
            None => Err(TransportError::ConnectionClosed.into()),
        }
    }

    pub async fn hostname(&self, target: &DeviceTarget) -> DeviceResult<String> {
        let output = self.checked(target, commands::HOSTNAME).await?;
        Ok(output.output.trim().to_string())
    }

    /// Contents of `/etc/os-release`
    pub async fn firmware_version(&self, target: &DeviceTarget) -> DeviceResult<String> {
        let output = self.checked(target, commands::FIRMWARE_VERSION).await?;
        Ok(output.output)
    }

    /// Reboot; the link dropping mid-command counts as success
    pub async fn reboot(&self, target: &DeviceTarget) -> DeviceResult<()> {
        match self.checked(target, commands::REBOOT).await {
            Ok(_) => Ok(()),
            Err(DeviceError::Transport(TransportError::ConnectionClosed)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn set_console_on_uart(&self, target: &DeviceTarget, enabled: bool) -> DeviceResult<()> {
        self.checked(target, &commands::console_on_uart(enabled)).await?;
        Ok(())
    }

    /// Generate a new WFB key pair on the device
    pub async fn generate_keys(&self, target: &DeviceTarget) -> DeviceResult<()> {
        self.checked(target, commands::KEYGEN).await?;
        Ok(())
    }

    pub async fn restart_service(&self, target: &DeviceTarget, service: Service) -> DeviceResult<()> {
        self.checked(target, service.restart_command()).await?;
        Ok(())
    }
}
