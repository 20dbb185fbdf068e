// src/types.rs

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a single preview instance.
///
/// `Stopped -> Starting -> {Running | Failed | Timeout}`, `Running -> {Stopped |
/// Failed}` when the process exits, and any state `-> Stopped` on explicit
/// stop. Only a fresh start leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Stopped,
    Starting,
    Running,
    Failed,
    Timeout,
}

impl InstanceStatus {
    /// States the instance can only leave through a fresh start.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceStatus::Stopped | InstanceStatus::Failed | InstanceStatus::Timeout
        )
    }

    /// States in which the instance owns a port and may receive traffic.
    pub fn is_live(self) -> bool {
        matches!(self, InstanceStatus::Starting | InstanceStatus::Running)
    }

    /// States for which diagnostics are attached to public summaries.
    pub fn has_diagnostics(self) -> bool {
        matches!(self, InstanceStatus::Failed | InstanceStatus::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Running => "running",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
