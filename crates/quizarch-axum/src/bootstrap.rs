//! Composition root: wire settings, adapters, scheduler and server.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use quizarch_core::ports::moodle::MoodleApiFactory;
use quizarch_core::Settings;
use quizarch_engine::{ChromiumRenderer, JobDeps, LopdfOptimizer, Scheduler, Supervisor};
use quizarch_moodle::DefaultMoodleApiFactory;

use crate::routes::create_router;
use crate::state::{AppContext, AppState};
use crate::{APP_NAME, VERSION};

/// Build the application state and its (not yet spawned) supervisor.
///
/// Tests inject their own factory and job dependencies; [`serve`] wires the
/// production ones.
#[must_use]
pub fn build_state(
    settings: Settings,
    api_factory: Arc<dyn MoodleApiFactory>,
    deps: JobDeps,
) -> (AppState, Supervisor) {
    let (scheduler, supervisor) = Scheduler::new(&settings, deps);
    let state = Arc::new(AppContext {
        settings,
        scheduler,
        api_factory,
    });
    (state, supervisor)
}

/// Run the worker service until the process is terminated.
pub async fn serve(settings: Settings) -> Result<()> {
    let api_factory: Arc<dyn MoodleApiFactory> =
        Arc::new(DefaultMoodleApiFactory::new(settings.clone()));
    let deps = JobDeps {
        renderer: Arc::new(ChromiumRenderer::new(settings.clone())),
        pdf_optimizer: Arc::new(LopdfOptimizer::new()),
    };

    let (state, supervisor) = build_state(settings.clone(), api_factory, deps);
    let supervisor_task = supervisor.spawn();

    let addr = format!("{}:{}", settings.server_host, settings.server_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("{APP_NAME} {VERSION} listening on http://{addr}");

    let scheduler = state.scheduler.clone();
    axum::serve(listener, create_router(state)).await?;

    // Unreachable in normal operation; keep the shutdown path correct anyway
    scheduler.shutdown().await;
    supervisor_task.await?;
    Ok(())
}
