//! Progress reporting and terminal outcomes for remote operations

use serde::{Deserialize, Serialize};

/// One progress update emitted while a remote operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Coarse stage label (e.g. "kernel", "rootfs", "upload")
    pub stage: String,
    /// Percent complete, 0-100
    pub percent: u8,
    /// Raw output line or status text
    pub line: String,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, percent: u8, line: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: percent.min(100),
            line: line.into(),
        }
    }
}

/// Receiver of progress events
///
/// Any `FnMut(&ProgressEvent) + Send` closure is a sink, so callers can
/// forward into a channel, a progress bar, or a `Vec` in tests.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent) + Send,
{
    fn emit(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Terminal result of a remote operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum SessionOutcome<T> {
    Success(T),
    Failure(String),
    Timeout,
    Cancelled,
}

impl<T> SessionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SessionOutcome<U> {
        match self {
            Self::Success(v) => SessionOutcome::Success(f(v)),
            Self::Failure(reason) => SessionOutcome::Failure(reason),
            Self::Timeout => SessionOutcome::Timeout,
            Self::Cancelled => SessionOutcome::Cancelled,
        }
    }

    /// Success payload, if any
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }
}
