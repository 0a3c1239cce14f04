//! A single archive job and its execution phases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use quizarch_core::ports::{PdfOptimizer, ReportRenderer};
use quizarch_core::{
    JobDescriptor, JobStatus, JobSummary, QuizAttemptsTask, Settings, StatusExtras, WorkerError,
    WorkerResult, DEMO_MODE_MAX_ATTEMPTS,
};

use crate::{backup, hashing, metadata, packaging, render};

/// Dependencies a job needs at execution time, shared by all jobs.
#[derive(Clone)]
pub struct JobDeps {
    /// Report renderer (headless browser driver).
    pub renderer: Arc<dyn ReportRenderer>,
    /// Image-aware PDF post-processor.
    pub pdf_optimizer: Arc<dyn PdfOptimizer>,
}

/// Return early with `Cancelled` if the stop flag was raised.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> WorkerResult<()> {
    if cancel.is_cancelled() {
        Err(WorkerError::Cancelled)
    } else {
        Ok(())
    }
}

/// A single archive job processed by the worker.
pub struct ArchiveJob {
    id: Uuid,
    descriptor: JobDescriptor,
    settings: Settings,
    status: Mutex<(JobStatus, Option<StatusExtras>)>,
    last_status_update: Mutex<Option<Instant>>,
}

impl ArchiveJob {
    /// Create a job for a validated descriptor.
    ///
    /// In demo mode the attempt list is capped to the first
    /// [`DEMO_MODE_MAX_ATTEMPTS`] entries.
    #[must_use]
    pub fn new(mut descriptor: JobDescriptor, settings: Settings) -> Self {
        let over_demo_limit = settings.demo_mode
            && descriptor
                .quiz_attempts()
                .is_some_and(|task| task.attemptids.len() > DEMO_MODE_MAX_ATTEMPTS);
        if over_demo_limit {
            tracing::info!(
                "Demo mode: Only processing the first {DEMO_MODE_MAX_ATTEMPTS} quiz attempts!"
            );
            descriptor.truncate_attempts(DEMO_MODE_MAX_ATTEMPTS);
        }

        Self {
            id: Uuid::now_v7(),
            descriptor,
            settings,
            status: Mutex::new((JobStatus::Uninitialized, None)),
            last_status_update: Mutex::new(None),
        }
    }

    /// Unique, time-ordered identifier of this job.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The immutable request descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    /// The settings snapshot this job runs with.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status.lock().expect("status lock poisoned").0
    }

    /// Snapshot for the history ring and the HTTP surface.
    #[must_use]
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status(),
        }
    }

    /// Update the job status and optionally notify the host.
    ///
    /// A terminal status is immutable: later updates are ignored. Host
    /// notifications are best-effort; a failed notification is logged and
    /// never blocks progress.
    pub async fn set_status(
        &self,
        status: JobStatus,
        extras: Option<StatusExtras>,
        notify_moodle: bool,
    ) {
        {
            let mut state = self.status.lock().expect("status lock poisoned");
            if state.0.is_terminal() {
                tracing::warn!(
                    job = %self.id,
                    current = %state.0,
                    requested = %status,
                    "Ignoring status update on terminal job"
                );
                return;
            }
            *state = (status, extras);
        }

        if notify_moodle {
            let notified = self
                .descriptor
                .moodle_api()
                .update_job_status(self.id, &self.descriptor, status, extras)
                .await;
            if !notified {
                tracing::warn!(job = %self.id, status = %status, "Host status notification failed");
            }
            *self
                .last_status_update
                .lock()
                .expect("status timestamp lock poisoned") = Some(Instant::now());
        }
    }

    /// One-shot transition into `WAITING_FOR_BACKUP`.
    ///
    /// Backup subtasks run concurrently; only the first caller performs the
    /// transition and notifies the host.
    pub(crate) async fn enter_waiting_for_backup(&self) {
        {
            let mut state = self.status.lock().expect("status lock poisoned");
            if state.0 == JobStatus::WaitingForBackup || state.0.is_terminal() {
                return;
            }
            *state = (JobStatus::WaitingForBackup, None);
        }
        self.descriptor
            .moodle_api()
            .update_job_status(self.id, &self.descriptor, JobStatus::WaitingForBackup, None)
            .await;
        *self
            .last_status_update
            .lock()
            .expect("status timestamp lock poisoned") = Some(Instant::now());
    }

    /// Report render progress, rate-limited to the configured interval.
    pub(crate) async fn report_render_progress(&self, archived: usize, total: usize) {
        let percent = u8::try_from((archived * 100) / total.max(1)).unwrap_or(100);

        let due = {
            let last = self
                .last_status_update
                .lock()
                .expect("status timestamp lock poisoned");
            last.map_or(true, |t| t.elapsed() >= self.settings.status_reporting_interval)
        };

        if due {
            self.set_status(
                JobStatus::Running,
                Some(StatusExtras::progress(percent)),
                true,
            )
            .await;
        } else {
            tracing::debug!(
                "Skipping status update because reporting interval has not been reached yet"
            );
        }
    }

    /// Execute this job to a terminal status.
    ///
    /// `cancel` is the cooperative stop flag raised by the supervisor on
    /// timeout or shutdown; observing it maps the job to `TIMEOUT`. Any other
    /// failure maps to `FAILED`. Both notify the host; `FINISHED` does not,
    /// since the host closes the job on its own once the artifact was
    /// processed.
    pub async fn execute(self: Arc<Self>, deps: Arc<JobDeps>, cancel: CancellationToken) {
        tracing::info!(job = %self.id, "Processing job");
        self.set_status(JobStatus::Running, Some(StatusExtras::progress(0)), true)
            .await;

        match self.run(&deps, &cancel).await {
            Ok(()) => {
                self.set_status(JobStatus::Finished, None, false).await;
                tracing::info!(job = %self.id, "Finished job");
            }
            Err(e) if e.is_cancelled() => {
                tracing::warn!(job = %self.id, "Job termination requested. Terminated gracefully.");
                self.set_status(JobStatus::Timeout, None, true).await;
            }
            Err(e) => {
                tracing::error!(job = %self.id, "Job failed with error: {e}");
                self.set_status(JobStatus::Failed, None, true).await;
            }
        }
    }

    /// The fallible pipeline behind [`execute`](Self::execute).
    ///
    /// The working directory and the archive staging directory are scoped to
    /// this function and removed on every exit path.
    async fn run(&self, deps: &JobDeps, cancel: &CancellationToken) -> WorkerResult<()> {
        let workdir = tempfile::tempdir()?;
        tracing::debug!(job = %self.id, workdir = %workdir.path().display(), "Using temporary working directory");

        let mut archived_attempts: BTreeMap<u64, PathBuf> = BTreeMap::new();

        if let Some(task) = self.descriptor.quiz_attempts() {
            self.process_quiz_attempts(deps, workdir.path(), task, &mut archived_attempts, cancel)
                .await?;

            if task.fetch_metadata {
                ensure_not_cancelled(cancel)?;
                metadata::write_attempts_metadata(self, workdir.path(), &archived_attempts).await?;
            }
        }

        if !self.descriptor.moodle_backups().is_empty() {
            backup::process_moodle_backups(self, workdir.path(), cancel).await?;
        }

        self.set_status(JobStatus::Finalizing, None, true).await;

        tracing::info!(job = %self.id, "Calculating file hashes ...");
        hashing::write_tree_hashes(workdir.path(), cancel).await?;

        tracing::info!(job = %self.id, "Generating final archive ...");
        let staging = tempfile::tempdir()?;
        let archive_path = packaging::build_archive(
            workdir.path(),
            staging.path(),
            self.descriptor.archive_filename(),
        )
        .await?;

        ensure_not_cancelled(cancel)?;
        let archive_sha256 = hashing::file_sha256_hex(&archive_path).await?;

        ensure_not_cancelled(cancel)?;
        self.push_artifact(&archive_path, &archive_sha256).await?;

        Ok(())
    }

    /// Render all attempts through a single browser session.
    async fn process_quiz_attempts(
        &self,
        deps: &JobDeps,
        workdir: &Path,
        task: &QuizAttemptsTask,
        archived_attempts: &mut BTreeMap<u64, PathBuf>,
        cancel: &CancellationToken,
    ) -> WorkerResult<()> {
        tokio::fs::create_dir_all(workdir.join("attempts")).await?;

        let session = deps
            .renderer
            .open_session(self.descriptor.moodle_api().endpoints().base_url())
            .await?;
        tracing::debug!(job = %self.id, "Opened report render session");

        let result = render::archive_attempts(
            self,
            deps,
            session.as_ref(),
            workdir,
            task,
            archived_attempts,
            cancel,
        )
        .await;

        if let Err(e) = session.close().await {
            tracing::warn!(job = %self.id, "Failed to close render session: {e}");
        } else {
            tracing::debug!(job = %self.id, "Closed report render session");
        }

        result
    }

    /// Upload the artifact and invoke the processing callback.
    async fn push_artifact(&self, artifact: &Path, artifact_sha256: &str) -> WorkerResult<()> {
        let api = self.descriptor.moodle_api();
        let upload = api.upload_file(artifact).await?;
        api.process_uploaded_artifact(self.id, &self.descriptor, &upload, artifact_sha256)
            .await?;
        tracing::info!(job = %self.id, "Processed uploaded artifact successfully.");
        Ok(())
    }
}
