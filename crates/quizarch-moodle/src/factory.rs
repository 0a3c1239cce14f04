//! Default adapter factory, used by the HTTP layer at admission time.

use std::sync::Arc;

use quizarch_core::ports::moodle::{ApiVariant, MoodleApi, MoodleApiFactory, MoodleEndpoints};
use quizarch_core::{Settings, WorkerError};

use crate::archivingmod::ArchivingmodQuizApi;
use crate::client::build_http_client;
use crate::quiz_archiver::QuizArchiverApi;

/// Builds reqwest-backed adapters with the worker's proxy/TLS policy applied.
pub struct DefaultMoodleApiFactory {
    settings: Settings,
}

impl DefaultMoodleApiFactory {
    /// Create a factory for the given settings.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl MoodleApiFactory for DefaultMoodleApiFactory {
    fn create(
        &self,
        variant: ApiVariant,
        endpoints: MoodleEndpoints,
    ) -> Result<Arc<dyn MoodleApi>, WorkerError> {
        let http = build_http_client(&self.settings)?;
        Ok(match variant {
            ApiVariant::QuizArchiver => Arc::new(QuizArchiverApi::new(http, endpoints)),
            ApiVariant::ArchivingmodQuiz => Arc::new(ArchivingmodQuizApi::new(http, endpoints)),
        })
    }
}
