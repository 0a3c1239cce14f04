//! Host-side backup states.

use serde::{Deserialize, Serialize};

/// Status of an asynchronously produced host backup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    /// The backup is still being produced.
    Pending,
    /// The backup finished and can be downloaded.
    Success,
    /// The backup failed on the host side.
    Failed,
}

impl BackupStatus {
    /// Parse the raw status string returned by the host web service.
    ///
    /// Unknown values are returned as `Err` so callers can fail the subtask
    /// with the verbatim host status in the message.
    pub fn from_wire(value: &str) -> Result<Self, String> {
        match value {
            "E_BACKUP_PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "E_BACKUP_FAILED" => Ok(Self::Failed),
            other => Err(other.to_string()),
        }
    }
}
