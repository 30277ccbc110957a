//! Upgrade monitor
//!
//! Runs a long command (normally `sysupgrade`) in an interactive shell and
//! turns its output into progress events until a terminal state:
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Completed | TimedOut | Cancelled
//!                                  | ConnectionLost | Failed
//! ```
//!
//! Each poll tick checks, in order: cancellation, the deadline, the link.
//! Only then is new output drained. Cancellation is checked once more before
//! a terminal marker is honoured, so a cancel always wins a tie.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fpvconf_core::{DeviceTarget, ProgressEvent, ProgressSink, SessionOutcome};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RemoteConfig, UpgradeConfig};
use crate::milestone::{MilestoneTable, ProgressTracker};
use crate::transport::{Connector, ShellChannel, ShellRead};

/// Monitor state; the last five are terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    TimedOut,
    Cancelled,
    ConnectionLost,
    Failed(String),
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Connecting | Self::Streaming)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// What happened during one monitor run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Terminal state
    pub state: MonitorState,
    /// Every state entered, starting with `Idle`
    pub history: Vec<MonitorState>,
    /// Last progress estimate
    pub percent: u8,
    /// Output lines seen
    pub lines: usize,
}

impl MonitorReport {
    /// Collapse into the outcome shape shared with other operations
    pub fn outcome(&self) -> SessionOutcome<u8> {
        match &self.state {
            MonitorState::Completed => SessionOutcome::Success(self.percent),
            MonitorState::TimedOut => SessionOutcome::Timeout,
            MonitorState::Cancelled => SessionOutcome::Cancelled,
            MonitorState::ConnectionLost => SessionOutcome::Failure("connection lost".into()),
            MonitorState::Failed(reason) => SessionOutcome::Failure(reason.clone()),
            other => SessionOutcome::Failure(format!("stopped while {}", other)),
        }
    }
}

/// Streams a long-running command and infers completion from milestones
pub struct UpgradeMonitor {
    connector: Arc<dyn Connector>,
    deadline: Duration,
    poll_interval: Duration,
    connect_timeout: Duration,
    milestones: MilestoneTable,
    state: MonitorState,
    history: Vec<MonitorState>,
}

impl UpgradeMonitor {
    pub fn new(connector: Arc<dyn Connector>, upgrade: &UpgradeConfig) -> Self {
        Self {
            connector,
            deadline: upgrade.deadline(),
            poll_interval: upgrade.poll_interval(),
            connect_timeout: crate::config::TimeoutsConfig::default().connect(),
            milestones: upgrade.milestones.clone(),
            state: MonitorState::Idle,
            history: vec![MonitorState::Idle],
        }
    }

    pub fn from_config(connector: Arc<dyn Connector>, config: &RemoteConfig) -> Self {
        Self::new(connector, &config.upgrade).with_connect_timeout(config.timeouts.connect())
    }

    /// Override the wall-clock deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    fn enter(&mut self, state: MonitorState) {
        debug!(from = %self.state, to = %state, "Monitor transition");
        self.history.push(state.clone());
        self.state = state;
    }

    fn finish(&mut self, state: MonitorState, tracker: &ProgressTracker, lines: usize) -> MonitorReport {
        match &state {
            MonitorState::Completed => info!("Upgrade completed"),
            other => warn!("Upgrade ended: {}", other),
        }
        self.enter(state);
        MonitorReport {
            state: self.state.clone(),
            history: std::mem::take(&mut self.history),
            percent: tracker.percent(),
            lines,
        }
    }

    /// Run `command` on `target` until a terminal state
    ///
    /// Progress events go to `sink`. The shell is closed before returning
    /// in every terminal state.
    pub async fn run(
        &mut self,
        target: &DeviceTarget,
        command: &str,
        cancel: &CancellationToken,
        sink: &mut dyn ProgressSink,
    ) -> MonitorReport {
        let tracker = ProgressTracker::new();
        self.history = vec![MonitorState::Idle];
        self.state = MonitorState::Idle;

        self.enter(MonitorState::Connecting);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(self.connect_timeout, self.connector.open_shell(target)) => Some(result),
        };
        let mut shell = match opened {
            None => return self.finish(MonitorState::Cancelled, &tracker, 0),
            Some(Err(_)) => {
                let reason = format!("could not open shell within {:?}", self.connect_timeout);
                return self.finish(MonitorState::Failed(reason), &tracker, 0);
            }
            Some(Ok(Err(e))) => {
                return self.finish(MonitorState::Failed(e.to_string()), &tracker, 0);
            }
            Some(Ok(Ok(shell))) => shell,
        };

        let (state, tracker, lines) = self.stream(shell.as_mut(), command, cancel, sink, tracker).await;
        shell.close().await;
        self.finish(state, &tracker, lines)
    }

    async fn stream(
        &mut self,
        shell: &mut dyn ShellChannel,
        command: &str,
        cancel: &CancellationToken,
        sink: &mut dyn ProgressSink,
        mut tracker: ProgressTracker,
    ) -> (MonitorState, ProgressTracker, usize) {
        self.enter(MonitorState::Streaming);
        if let Err(e) = shell.write(format!("{}\n", command).as_bytes()).await {
            return (MonitorState::Failed(e.to_string()), tracker, 0);
        }
        let deadline = Instant::now() + self.deadline;
        let mut lines = LineBuffer::default();
        let mut seen = 0usize;

        loop {
            if cancel.is_cancelled() {
                return (MonitorState::Cancelled, tracker, seen);
            }
            let now = Instant::now();
            if now >= deadline {
                return (MonitorState::TimedOut, tracker, seen);
            }
            if !shell.is_connected() {
                return (MonitorState::ConnectionLost, tracker, seen);
            }

            let wait = self.poll_interval.min(deadline - now);
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => continue,
                read = shell.read(wait) => read,
            };

            let mut completed = false;
            let mut ended = false;
            match read {
                Ok(ShellRead::Data(data)) => lines.push(&data),
                Ok(ShellRead::Idle) => {}
                Ok(ShellRead::Closed) => {
                    lines.flush();
                    ended = true;
                }
                Err(e) => {
                    debug!("Shell read failed: {}", e);
                    return (MonitorState::ConnectionLost, tracker, seen);
                }
            }

            for line in lines.drain() {
                seen += 1;
                if tracker.observe(&self.milestones, &line) {
                    completed = true;
                }
                sink.emit(&ProgressEvent::new(tracker.stage(), tracker.percent(), line));
            }

            if completed {
                if cancel.is_cancelled() {
                    return (MonitorState::Cancelled, tracker, seen);
                }
                return (MonitorState::Completed, tracker, seen);
            }
            if ended {
                let state = if shell.is_connected() {
                    MonitorState::Failed("did not complete".into())
                } else {
                    MonitorState::ConnectionLost
                };
                return (state, tracker, seen);
            }
        }
    }
}

/// Splits shell output into lines, keeping a partial tail for later
///
/// Bytes are decoded a whole line at a time, so a character split across
/// two reads comes out intact.
#[derive(Default)]
struct LineBuffer {
    partial: Vec<u8>,
    ready: Vec<String>,
}

impl LineBuffer {
    fn push(&mut self, data: &[u8]) {
        self.partial.extend_from_slice(data);
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.keep(&String::from_utf8_lossy(&line));
        }
    }

    fn flush(&mut self) {
        let rest = std::mem::take(&mut self.partial);
        self.keep(&String::from_utf8_lossy(&rest));
    }

    fn keep(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);
        if !line.trim().is_empty() {
            self.ready.push(line.to_string());
        }
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_keeps_partial_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"Update kernel from /tmp/uImage\r\nKernel upd");
        assert_eq!(buf.drain(), vec!["Update kernel from /tmp/uImage"]);
        buf.push(b"ated to 4.9.84\n\n");
        assert_eq!(buf.drain(), vec!["Kernel updated to 4.9.84"]);
        buf.push(b"Unconditional reboot");
        assert!(buf.drain().is_empty());
        buf.flush();
        assert_eq!(buf.drain(), vec!["Unconditional reboot"]);
    }

    #[test]
    fn test_line_buffer_joins_split_characters() {
        let mut buf = LineBuffer::default();
        let line = "Mise à jour du noyau\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        buf.push(&line[..split]);
        assert!(buf.drain().is_empty());
        buf.push(&line[split..]);
        assert_eq!(buf.drain(), vec!["Mise à jour du noyau"]);

        buf.push("fin é".as_bytes().split_last().unwrap().1);
        buf.push(&[0xA9]);
        buf.flush();
        assert_eq!(buf.drain(), vec!["fin é"]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MonitorState::Streaming.is_terminal());
        assert!(MonitorState::Failed("x".into()).is_terminal());
        assert!(MonitorState::ConnectionLost.is_terminal());
    }

    #[test]
    fn test_report_outcome() {
        let report = MonitorReport {
            state: MonitorState::TimedOut,
            history: vec![],
            percent: 40,
            lines: 3,
        };
        assert_eq!(report.outcome(), SessionOutcome::Timeout);

        let report = MonitorReport {
            state: MonitorState::Completed,
            history: vec![],
            percent: 100,
            lines: 3,
        };
        assert_eq!(report.outcome(), SessionOutcome::Success(100));
    }
}
