//! Error and warning types for configuration codecs

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a parse or serialize call
#[derive(Debug, Error)]
pub enum CodecError {
    /// Update targets a nested path that is not a settable leaf
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Key cannot be written in this dialect
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Value cannot be represented in this dialect
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// Key is exposed for reading but may not be changed
    #[error("key is read-only: {0}")]
    ReadOnly(String),

    /// Driver options file has no `options` line to hold a new sub-key
    #[error("no 'options' line found for {0}")]
    MissingOptionsLine(String),

    /// Document is not valid YAML
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Why a field fell back to its default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    /// Key not present in the document
    Missing,
    /// Value present but not parseable as the field's type
    Invalid,
}

/// A field that could not be read and was defaulted
///
/// Warnings never abort a parse; they are collected so the caller can tell
/// the user which values are fabricated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub key: String,
    /// Raw text found in the document (empty when missing)
    pub raw: String,
    pub reason: WarningReason,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            WarningReason::Missing => write!(f, "{}: missing, using default", self.key),
            WarningReason::Invalid => {
                write!(f, "{}: invalid value '{}', using default", self.key, self.raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let w = ParseWarning {
            key: "channel".into(),
            raw: "16x".into(),
            reason: WarningReason::Invalid,
        };
        assert_eq!(w.to_string(), "channel: invalid value '16x', using default");

        let w = ParseWarning {
            key: "udp_port".into(),
            raw: String::new(),
            reason: WarningReason::Missing,
        };
        assert_eq!(w.to_string(), "udp_port: missing, using default");
    }

    #[test]
    fn test_error_display() {
        let err = CodecError::PathNotFound("video0.nope".into());
        assert_eq!(err.to_string(), "path not found: video0.nope");
    }
}
