//! Immutable description of one archive request.
//!
//! A [`JobDescriptor`] is built synchronously during request admission, after
//! the incoming envelope was decoded and validated. It binds the host API
//! adapter for the job and carries the (at most two) task slots. Once
//! constructed it never changes; the engine only reads from it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::names;
use crate::ports::moodle::MoodleApi;
use crate::types::paper_format::PaperFormat;

/// Identity of the archived activity on the host.
///
/// Either a task id (task-based API) or the course/cm/quiz triple (legacy
/// API); both are required to be strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobTarget {
    /// Task-based API: the id of the activity archiving task.
    Task {
        taskid: u64,
    },
    /// Legacy API: course, course-module and quiz ids.
    Quiz {
        courseid: u64,
        cmid: u64,
        quizid: u64,
    },
}

impl JobTarget {
    fn validate(self) -> Result<(), WorkerError> {
        let ok = match self {
            Self::Task { taskid } => taskid > 0,
            Self::Quiz {
                courseid,
                cmid,
                quizid,
            } => courseid > 0 && cmid > 0 && quizid > 0,
        };
        if ok {
            Ok(())
        } else {
            Err(WorkerError::validation(
                "Either the 3-tuple courseid, cmid and quizid or taskid must be given to create an archive request.",
            ))
        }
    }
}

/// Image optimization parameters for rendered PDFs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptimize {
    /// Maximum image width in pixels.
    pub width: u32,
    /// Maximum image height in pixels.
    pub height: u32,
    /// Re-encoding quality (0-100).
    pub quality: u8,
}

impl ImageOptimize {
    fn validate(self) -> Result<(), WorkerError> {
        if self.width < 1 {
            return Err(WorkerError::validation("Image optimization width is invalid."));
        }
        if self.height < 1 {
            return Err(WorkerError::validation(
                "Image optimization height is invalid.",
            ));
        }
        if self.quality > 100 {
            return Err(WorkerError::validation(
                "Image optimization quality is invalid.",
            ));
        }
        Ok(())
    }
}

/// Parameters of the quiz attempts task slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttemptsTask {
    /// Attempts to archive (non-empty).
    pub attemptids: Vec<u64>,
    /// Report sections to include, keyed by section name.
    pub sections: BTreeMap<String, bool>,
    /// Whether to build the attempts metadata CSV.
    pub fetch_metadata: bool,
    /// Whether to download per-attempt attachments.
    pub fetch_attachments: bool,
    /// Paper format for PDF export.
    pub paper_format: PaperFormat,
    /// Whether the rendered HTML DOM is kept next to the PDF.
    pub keep_html_files: bool,
    /// Pattern the host uses to derive the attempt folder name.
    pub foldername_pattern: String,
    /// Pattern the host uses to derive the attempt file stem.
    pub filename_pattern: String,
    /// Optional PDF image optimization parameters.
    pub image_optimize: Option<ImageOptimize>,
}

impl QuizAttemptsTask {
    fn validate(&self) -> Result<(), WorkerError> {
        if self.attemptids.is_empty() {
            return Err(WorkerError::validation("Attempt ID list is invalid."));
        }
        if self.sections.is_empty() {
            return Err(WorkerError::validation(
                "Attempt report sections are invalid.",
            ));
        }
        if self.foldername_pattern.is_empty() {
            return Err(WorkerError::validation("Folder name pattern is invalid."));
        }
        if self.filename_pattern.is_empty() {
            return Err(WorkerError::validation("Filename pattern is invalid."));
        }
        if let Some(optimize) = self.image_optimize {
            optimize.validate()?;
        }
        Ok(())
    }
}

/// One host backup to wait for and download.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodleBackupTask {
    /// Host-side id of the backup.
    pub backupid: String,
    /// Filename to store the backup as, below `backups/`.
    pub filename: String,
    /// Download URL; must live under the host base URL.
    pub file_download_url: String,
}

/// Validated, immutable description of one archive job.
#[derive(Clone)]
pub struct JobDescriptor {
    moodle_api: Arc<dyn MoodleApi>,
    target: JobTarget,
    archive_filename: String,
    quiz_attempts: Option<QuizAttemptsTask>,
    moodle_backups: Vec<MoodleBackupTask>,
}

impl JobDescriptor {
    /// Create a descriptor with no task slots.
    ///
    /// Fails with a validation error for an invalid target identity or an
    /// invalid archive filename.
    pub fn new(
        moodle_api: Arc<dyn MoodleApi>,
        target: JobTarget,
        archive_filename: impl Into<String>,
    ) -> Result<Self, WorkerError> {
        target.validate()?;
        let archive_filename = archive_filename.into();
        names::validate_archive_filename(&archive_filename)?;

        Ok(Self {
            moodle_api,
            target,
            archive_filename,
            quiz_attempts: None,
            moodle_backups: Vec::new(),
        })
    }

    /// Attach the quiz attempts task slot.
    pub fn with_quiz_attempts(mut self, task: QuizAttemptsTask) -> Result<Self, WorkerError> {
        task.validate()?;
        self.quiz_attempts = Some(task);
        Ok(self)
    }

    /// Append a backup retrieval task.
    ///
    /// The download URL must be prefixed by the host base URL, and the target
    /// filename is validated against the forbidden character set.
    pub fn add_moodle_backup(&mut self, backup: MoodleBackupTask) -> Result<(), WorkerError> {
        if backup.backupid.is_empty() {
            return Err(WorkerError::validation("Moodle backup ID is invalid."));
        }
        names::validate_file_name_with_extension(&backup.filename)
            .map_err(|_| WorkerError::validation("Moodle backup filename is invalid."))?;
        if !backup
            .file_download_url
            .starts_with(self.moodle_api.endpoints().base_url())
        {
            return Err(WorkerError::validation(
                "Moodle backup file download URL is invalid.",
            ));
        }
        self.moodle_backups.push(backup);
        Ok(())
    }

    /// The host API adapter bound to this job.
    #[must_use]
    pub fn moodle_api(&self) -> &Arc<dyn MoodleApi> {
        &self.moodle_api
    }

    /// The archived activity identity.
    #[must_use]
    pub const fn target(&self) -> JobTarget {
        self.target
    }

    /// Archive filename, without extension.
    #[must_use]
    pub fn archive_filename(&self) -> &str {
        &self.archive_filename
    }

    /// The quiz attempts task slot, if requested.
    #[must_use]
    pub const fn quiz_attempts(&self) -> Option<&QuizAttemptsTask> {
        self.quiz_attempts.as_ref()
    }

    /// The backup tasks (possibly empty).
    #[must_use]
    pub fn moodle_backups(&self) -> &[MoodleBackupTask] {
        &self.moodle_backups
    }

    /// Cap the attempt list to the first `limit` entries (demo mode).
    pub fn truncate_attempts(&mut self, limit: usize) {
        if let Some(task) = self.quiz_attempts.as_mut() {
            task.attemptids.truncate(limit);
        }
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("target", &self.target)
            .field("archive_filename", &self.archive_filename)
            .field("quiz_attempts", &self.quiz_attempts)
            .field("moodle_backups", &self.moodle_backups)
            .finish_non_exhaustive()
    }
}
