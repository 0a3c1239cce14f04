//! Job and worker status enums.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single archive job.
///
/// Transitions are strictly monotone along
/// `UNINITIALIZED → AWAITING_PROCESSING → RUNNING → (WAITING_FOR_BACKUP ↔
/// RUNNING)* → FINALIZING → FINISHED`, with the terminal failure branches
/// `FAILED` and `TIMEOUT`. Once a terminal status is reached it never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Uninitialized,
    AwaitingProcessing,
    Running,
    WaitingForBackup,
    Finalizing,
    Finished,
    Failed,
    Timeout,
}

impl JobStatus {
    /// Wire representation, as reported to the host and via `/status/{id}`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::AwaitingProcessing => "AWAITING_PROCESSING",
            Self::Running => "RUNNING",
            Self::WaitingForBackup => "WAITING_FOR_BACKUP",
            Self::Finalizing => "FINALIZING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Check whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Timeout)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional status information forwarded to the host alongside a status
/// update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusExtras {
    /// Completion percentage of the current phase (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl StatusExtras {
    /// Create extras carrying a progress percentage.
    #[must_use]
    pub const fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
        }
    }
}

/// Observable status of the worker as a whole, derived from queue depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    /// The queue is empty.
    Idle,
    /// The queue holds at least one job but has remaining capacity.
    Active,
    /// The queue is full.
    Busy,
}

impl WorkerStatus {
    /// Derive the worker status from queue depth and capacity.
    #[must_use]
    pub const fn from_queue_depth(len: usize, capacity: usize) -> Self {
        if len == 0 {
            Self::Idle
        } else if len >= capacity {
            Self::Busy
        } else {
            Self::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names_are_screaming_snake_case() {
        let json = serde_json::to_string(&JobStatus::WaitingForBackup).unwrap();
        assert_eq!(json, "\"WAITING_FOR_BACKUP\"");
        assert_eq!(JobStatus::AwaitingProcessing.as_str(), "AWAITING_PROCESSING");
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::WaitingForBackup.is_terminal());
    }

    #[test]
    fn worker_status_matches_queue_depth() {
        assert_eq!(WorkerStatus::from_queue_depth(0, 8), WorkerStatus::Idle);
        assert_eq!(WorkerStatus::from_queue_depth(1, 8), WorkerStatus::Active);
        assert_eq!(WorkerStatus::from_queue_depth(7, 8), WorkerStatus::Active);
        assert_eq!(WorkerStatus::from_queue_depth(8, 8), WorkerStatus::Busy);
    }
}
