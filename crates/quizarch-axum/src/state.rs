//! Shared application state for the HTTP surface.

use std::sync::Arc;

use quizarch_core::ports::moodle::MoodleApiFactory;
use quizarch_core::Settings;
use quizarch_engine::Scheduler;

/// Application context handed to every handler.
pub struct AppContext {
    /// Global worker settings.
    pub settings: Settings,
    /// Admission-side handle to the job queue and history.
    pub scheduler: Scheduler,
    /// Factory building host API adapters for decoded requests.
    pub api_factory: Arc<dyn MoodleApiFactory>,
}

/// Axum state type.
pub type AppState = Arc<AppContext>;
