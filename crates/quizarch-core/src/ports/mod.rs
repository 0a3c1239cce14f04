//! Port definitions (trait abstractions) consumed by the engine.
//!
//! Concrete implementations live in adapter crates: `quizarch-moodle` for the
//! host API, `quizarch-engine` for the browser renderer and PDF optimizer.

pub mod moodle;
pub mod pdf;
pub mod renderer;

pub use moodle::{
    ApiVariant, AttemptAttachment, AttemptData, FileDownloadRequest, MetadataRow, MoodleApi,
    MoodleApiFactory, MoodleEndpoints, RemoteFileMetadata, UploadedFile,
};
pub use pdf::PdfOptimizer;
pub use renderer::{RenderSession, ReportRenderer};
