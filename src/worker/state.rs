//! Worker status state machine.

use serde::{Deserialize, Serialize};

/// Status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Not running. Initial state, and terminal after `stop()` until the next `start()`.
    Offline,
    /// Waiting to pick up a task.
    Idle,
    /// Executing a task with visible progress.
    Working,
    /// Faulted by an injected error; recovers on its own.
    Error,
}

impl WorkerStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: WorkerStatus) -> bool {
        use WorkerStatus::*;

        matches!(
            (self, target),
            // start()
            (Offline, Idle) |
            // idle delay fired
            (Idle, Working) |
            // task completed or failed, or pause()
            (Working, Idle) |
            // auto-recovery
            (Error, Idle) |
            // handle_error() from anywhere
            (_, Error) |
            // stop() from anywhere
            (_, Offline)
        )
    }

    /// Whether uptime accrues in this status.
    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
