//! Informational endpoints: index, version, worker status, job status.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use quizarch_core::{JobSummary, WorkerStatus};

use crate::error::HttpError;
use crate::state::AppState;
use crate::{APP_NAME, VERSION};

/// Response body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct WorkerStatusBody {
    /// Worker status derived from queue depth.
    pub status: WorkerStatus,
    /// Number of queued jobs.
    pub queue_len: usize,
}

/// `GET /` - application identity.
pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "app": APP_NAME,
        "version": VERSION,
    }))
}

/// `GET /version`.
pub async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": VERSION }))
}

/// `GET /status` - worker status and queue depth.
pub async fn worker_status(State(state): State<AppState>) -> Json<WorkerStatusBody> {
    Json(WorkerStatusBody {
        status: state.scheduler.worker_status(),
        queue_len: state.scheduler.queue_len(),
    })
}

/// `GET /status/{jobid}` - status of a job from the history ring.
pub async fn job_status(
    State(state): State<AppState>,
    Path(jobid): Path<String>,
) -> Result<Json<JobSummary>, HttpError> {
    state
        .scheduler
        .history()
        .get(&jobid)
        .map(|job| Json(job.summary()))
        .ok_or_else(|| {
            HttpError::not_found(format!(
                "Job with requested jobid '{jobid}' was not found"
            ))
        })
}
