//! Job scheduling and archive pipeline engine.
//!
//! Owns the bounded job queue, the single-drain supervisor with per-job
//! timeout, the job state machine and the pipeline stages (attempt rendering,
//! backup retrieval, metadata CSV, tree hashing, packaging, upload). Also
//! provides the concrete adapters for the browser renderer (chromiumoxide)
//! and the PDF optimizer (lopdf + image).

mod backup;
pub mod browser;
pub mod hashing;
pub mod history;
pub mod job;
mod metadata;
pub mod packaging;
pub mod pdf;
mod render;
pub mod scheduler;

pub use browser::ChromiumRenderer;
pub use history::JobHistory;
pub use job::{ArchiveJob, JobDeps};
pub use pdf::LopdfOptimizer;
pub use scheduler::{Scheduler, Supervisor};

// Silence unused dev-dependency warnings; mock-based tests live in tests/
#[cfg(test)]
use mockall as _;
