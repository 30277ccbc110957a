//! Error types for the remote engine

use fpvconf_codec::CodecError;
use thiserror::Error;

/// Failures of a single remote operation
///
/// A command that runs but exits non-zero is not a transport failure; see
/// [`CommandOutput`](crate::transport::CommandOutput).
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    /// Host unreachable, refused, or the SSH handshake failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Credentials rejected by the device
    #[error("Authentication failed for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    /// Operation deadline exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Local or remote source does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// File-copy protocol failure
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Unexpected bytes from the device
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Aborted by the caller
    #[error("Cancelled")]
    Cancelled,

    /// Session or channel closed underneath an operation
    #[error("Connection closed")]
    ConnectionClosed,

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// `true` for unreachable/auth failures, which callers usually show as
    /// "device unreachable" rather than as an operation failure
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::AuthenticationFailed { .. } | Self::ConnectionClosed
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors around an upgrade run that are not monitor states
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Milestone table entry that could never work
    #[error("Invalid milestone #{index}: {reason}")]
    InvalidMilestone { index: usize, reason: String },

    /// Uploading an image to the device failed before the upgrade started
    #[error("Failed to stage {image}: {source}")]
    Staging {
        image: String,
        #[source]
        source: TransportError,
    },
}

/// Errors from reading or writing a device configuration file
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{file}: {source}")]
    Codec {
        file: String,
        #[source]
        source: CodecError,
    },

    /// The device file is not valid UTF-8
    #[error("{0} is not a text file")]
    NotText(String),

    /// A device command exited non-zero
    #[error("'{command}' exited with status {status}: {output}")]
    CommandFailed {
        command: String,
        status: u32,
        output: String,
    },
}

impl DeviceError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connection_error())
    }
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_grouping() {
        assert!(TransportError::ConnectionFailed("refused".into()).is_connection_error());
        assert!(TransportError::AuthenticationFailed {
            user: "root".into(),
            host: "192.168.1.10".into()
        }
        .is_connection_error());
        assert!(!TransportError::Timeout("exec".into()).is_connection_error());
        assert!(!TransportError::TransferFailed("short read".into()).is_connection_error());
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err: TransportError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[test]
    fn test_device_error_wraps_transport() {
        let err: DeviceError = TransportError::ConnectionClosed.into();
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Connection closed");
    }
}
