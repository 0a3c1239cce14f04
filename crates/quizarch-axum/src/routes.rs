//! Route definitions and router construction.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the worker's router.
///
/// # Path Parameter Syntax
/// Axum 0.8 uses brace syntax for path parameters: `{jobid}`
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::status::index))
        .route("/version", get(handlers::status::version))
        .route("/status", get(handlers::status::worker_status))
        .route("/status/{jobid}", get(handlers::status::job_status))
        // Bare /archive is the backwards-compatible alias of the legacy API
        .route("/archive", post(handlers::archive::quiz_archiver))
        .route(
            "/archive/quiz_archiver",
            post(handlers::archive::quiz_archiver),
        )
        .route(
            "/archive/archivingmod_quiz",
            post(handlers::archive::archivingmod_quiz),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
