//! Job domain types: lifecycle status and the immutable job descriptor.

pub mod descriptor;
pub mod status;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use status::JobStatus;

/// Snapshot of a job for the history ring and the `/status/{id}` endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job identifier.
    pub id: Uuid,
    /// Status at snapshot time.
    pub status: JobStatus,
}
