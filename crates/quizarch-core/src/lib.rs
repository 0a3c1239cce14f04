//! Core domain types and port definitions for the quiz archive worker.
//!
//! This crate is infrastructure-free: it defines the job data model, the
//! error taxonomy, name validation, environment-driven settings and the ports
//! through which the engine reaches the host API, the headless browser and
//! the PDF post-processor.

pub mod error;
pub mod job;
pub mod names;
pub mod ports;
pub mod settings;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{WorkerError, WorkerResult};
pub use job::descriptor::{
    ImageOptimize, JobDescriptor, JobTarget, MoodleBackupTask, QuizAttemptsTask,
};
pub use job::status::{JobStatus, StatusExtras, WorkerStatus};
pub use job::JobSummary;
pub use ports::{
    ApiVariant, AttemptAttachment, AttemptData, FileDownloadRequest, MetadataRow, MoodleApi,
    MoodleApiFactory, MoodleEndpoints, PdfOptimizer, RemoteFileMetadata, RenderSession,
    ReportRenderer, UploadedFile,
};
pub use settings::{ProxySettings, Settings, SettingsError, DEMO_MODE_MAX_ATTEMPTS};
pub use types::backup_status::BackupStatus;
pub use types::paper_format::PaperFormat;
pub use types::report_signal::ReportSignal;

// Silence unused dev-dependency warnings; mock-based tests live downstream
#[cfg(test)]
use mockall as _;
