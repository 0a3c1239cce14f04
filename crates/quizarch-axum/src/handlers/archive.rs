//! Archive request admission.
//!
//! Admission is synchronous: decode and validate the envelope, check queue
//! capacity, probe the host, then enqueue. A job exists only if every step
//! succeeded; the response carries the job id and `AWAITING_PROCESSING`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use quizarch_core::{JobDescriptor, JobStatus};
use quizarch_engine::ArchiveJob;

use crate::dto::{self, DecodeError};
use crate::error::HttpError;
use crate::state::AppState;

/// `POST /archive` and `POST /archive/quiz_archiver` (legacy envelope).
pub async fn quiz_archiver(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    handle_archive_request(&state, payload, dto::quiz_archiver::decode).await
}

/// `POST /archive/archivingmod_quiz` (task-based envelope).
pub async fn archivingmod_quiz(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    handle_archive_request(&state, payload, dto::archivingmod::decode).await
}

type Decoder = fn(
    &Value,
    &dyn quizarch_core::ports::moodle::MoodleApiFactory,
) -> Result<JobDescriptor, DecodeError>;

async fn handle_archive_request(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
    decode: Decoder,
) -> Response {
    let Ok(Json(payload)) = payload else {
        return HttpError::bad_request("Request payload must be JSON.").into_response();
    };
    tracing::debug!(payload = %payload, "Received new archive request");

    let descriptor = match decode(&payload, state.api_factory.as_ref()) {
        Ok(descriptor) => descriptor,
        Err(DecodeError::Incomplete) => {
            tracing::debug!("JSON is technically incomplete or missing a required parameter");
            return HttpError::bad_request(
                "JSON is technically incomplete or missing a required parameter.",
            )
            .into_response();
        }
        Err(DecodeError::Invalid(message)) => {
            tracing::debug!("JSON data is invalid: {message}");
            return HttpError::bad_request(format!("JSON data is invalid: {message}"))
                .into_response();
        }
    };

    // Check queue capacity early to fail before the host round-trip
    if state.scheduler.is_full() {
        tracing::debug!("Maximum number of queued jobs exceeded");
        return HttpError::too_many_requests("Maximum number of queued jobs exceeded.")
            .into_response();
    }

    // Probe the host API (wstoken validity)
    if !descriptor.moodle_api().check_connection().await {
        return HttpError::bad_request(format!(
            "Could not establish a connection to Moodle webservice API at \"{}\" using the provided wstoken.",
            descriptor.moodle_api().endpoints().ws_url()
        ))
        .into_response();
    }

    let job = Arc::new(ArchiveJob::new(descriptor, state.settings.clone()));
    // The queue enforces the actual capacity limit here
    if state.scheduler.try_enqueue(Arc::clone(&job)).is_err() {
        tracing::debug!("Maximum number of queued jobs exceeded");
        return HttpError::too_many_requests("Maximum number of queued jobs exceeded.")
            .into_response();
    }

    job.set_status(JobStatus::AwaitingProcessing, None, false)
        .await;
    tracing::info!(job = %job.id(), "Enqueued job");

    Json(json!({
        "jobid": job.id(),
        "status": job.status(),
    }))
    .into_response()
}
