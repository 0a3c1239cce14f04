//! Worker error taxonomy.
//!
//! Every fallible operation in the worker funnels into [`WorkerError`]. The
//! variants follow the failure classes that matter for job outcomes: admission
//! rejects `Validation` and `QueueFull`, a running job maps `Cancelled` to the
//! `TIMEOUT` terminal status and everything else to `FAILED`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type shared by all worker components.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerError {
    /// Malformed request data, bad names, API version mismatch.
    #[error("{0}")]
    Validation(String),

    /// The job queue is at capacity.
    #[error("Maximum number of queued jobs exceeded.")]
    QueueFull {
        /// Configured queue capacity.
        max_size: usize,
    },

    /// The host (or another remote endpoint) could not be reached.
    #[error("Connection error: {message}")]
    Connectivity {
        /// Detailed error message.
        message: String,
    },

    /// The host responded, but with an error code or an invalid/incomplete
    /// response body.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Detailed error message.
        message: String,
    },

    /// A downloaded file failed verification (checksum, content type, size).
    #[error("Integrity error: {message}")]
    Integrity {
        /// Detailed error message.
        message: String,
    },

    /// Report rendering failed.
    #[error("Render error: {message}")]
    Render {
        /// Detailed error message.
        message: String,
    },

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "NotFound", "PermissionDenied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The cooperative stop flag was observed.
    #[error("Job cancelled")]
    Cancelled,
}

impl WorkerError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Create a render error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Check if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

/// Convenience result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_captures_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = WorkerError::from(io_err);

        match err {
            WorkerError::Io { kind, message } => {
                assert_eq!(kind, "NotFound");
                assert!(message.contains("missing file"));
            }
            other => panic!("expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_is_detected() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(!WorkerError::validation("nope").is_cancelled());
    }

    #[test]
    fn queue_full_message_is_stable() {
        // The Moodle plugin matches on this exact string.
        let err = WorkerError::QueueFull { max_size: 8 };
        assert_eq!(err.to_string(), "Maximum number of queued jobs exceeded.");
    }

    #[test]
    fn error_serialization_roundtrip() {
        let err = WorkerError::integrity("SHA1 mismatch");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: WorkerError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }
}
