//! Milestone table used to infer upgrade progress from device output
//!
//! `sysupgrade` never reports a structured result; the device reboots when
//! it is done. Progress is inferred from substrings in its output, matched
//! case-insensitively in table order. The default table covers the OpenIPC
//! firmware seen so far and can be extended from configuration.

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// One recognised output fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Substring searched for (case-insensitive)
    pub pattern: String,
    /// Percent complete once this line has been seen
    pub percent: u8,
    /// Stage label reported with subsequent progress events
    pub stage: String,
    /// Seeing this line means the upgrade finished
    #[serde(default)]
    pub terminal: bool,
}

impl Milestone {
    pub fn new(pattern: impl Into<String>, percent: u8, stage: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            percent,
            stage: stage.into(),
            terminal: false,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    fn matches(&self, line_lower: &str) -> bool {
        line_lower.contains(&self.pattern.to_lowercase())
    }
}

/// Ordered milestone list; the first matching entry wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneTable(Vec<Milestone>);

impl Default for MilestoneTable {
    fn default() -> Self {
        Self(vec![
            Milestone::new("update kernel", 20, "kernel"),
            Milestone::new("kernel updated", 40, "kernel"),
            Milestone::new("update rootfs", 50, "rootfs"),
            Milestone::new("rootfs updated", 80, "rootfs"),
            Milestone::new("erasing overlay", 90, "overlay"),
            Milestone::new("arguments written", 95, "finalize"),
            Milestone::new("unconditional reboot", 100, "reboot").terminal(),
        ])
    }
}

impl MilestoneTable {
    pub fn new(milestones: Vec<Milestone>) -> Self {
        Self(milestones)
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.0
    }

    /// Append a milestone after the built-in ones
    pub fn push(&mut self, milestone: Milestone) {
        self.0.push(milestone);
    }

    /// First milestone whose pattern occurs in `line`
    pub fn match_line(&self, line: &str) -> Option<&Milestone> {
        let lower = line.to_lowercase();
        self.0.iter().find(|m| m.matches(&lower))
    }

    /// Reject entries that would match every line or overflow the percent
    pub fn validate(&self) -> Result<(), MonitorError> {
        for (index, m) in self.0.iter().enumerate() {
            if m.pattern.trim().is_empty() {
                return Err(MonitorError::InvalidMilestone {
                    index,
                    reason: "empty pattern".into(),
                });
            }
            if m.percent > 100 {
                return Err(MonitorError::InvalidMilestone {
                    index,
                    reason: format!("percent {} is above 100", m.percent),
                });
            }
        }
        if !self.0.iter().any(|m| m.terminal) {
            return Err(MonitorError::InvalidMilestone {
                index: self.0.len(),
                reason: "no terminal milestone".into(),
            });
        }
        Ok(())
    }
}

/// Running progress estimate; percent never goes backwards
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    percent: u8,
    stage: String,
    completed: bool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            percent: 0,
            stage: "upgrade".to_string(),
            completed: false,
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line; returns `true` if it was a terminal marker
    pub fn observe(&mut self, table: &MilestoneTable, line: &str) -> bool {
        let Some(milestone) = table.match_line(line) else {
            return false;
        };
        self.percent = self.percent.max(milestone.percent);
        self.stage = milestone.stage.clone();
        if milestone.terminal {
            self.completed = true;
            self.percent = 100;
        }
        milestone.terminal
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn completed(&self) -> bool {
        self.completed
    }
}
