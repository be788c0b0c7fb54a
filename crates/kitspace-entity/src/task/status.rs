//! Task and asset status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a task and of every asset it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, waiting for dependencies or a worker slot.
    Queued,
    /// The converter is running.
    Running,
    /// Outputs are fully written to the store.
    Done,
    /// The task failed; the error is retained.
    Failed,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Check if the task is still pending or running.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
