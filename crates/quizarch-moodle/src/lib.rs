//! Moodle web-service API adapters.
//!
//! Implements the `MoodleApi` port of `quizarch-core` for the two supported
//! host plugin APIs: the legacy `quiz_archiver` API and the task-based
//! `archivingmod_quiz` API. The shared wire plumbing (token parameters,
//! lenient JSON decoding for HTML-wrapped responses, error envelopes, file
//! transfer) lives in [`ws`]; variant differences are confined to the two
//! adapter modules.

pub mod archivingmod;
pub mod client;
pub mod factory;
pub mod quiz_archiver;
mod ws;

pub use archivingmod::ArchivingmodQuizApi;
pub use client::build_http_client;
pub use factory::DefaultMoodleApiFactory;
pub use quiz_archiver::QuizArchiverApi;
