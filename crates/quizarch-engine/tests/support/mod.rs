//! Shared test doubles for the engine integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use quizarch_core::ports::moodle::{
    FileDownloadRequest, MoodleApi, MoodleEndpoints, RemoteFileMetadata, UploadedFile,
};
use quizarch_core::ports::{RenderSession, ReportRenderer};
use quizarch_core::{
    AttemptAttachment, AttemptData, BackupStatus, JobDescriptor, JobStatus, JobTarget,
    MetadataRow, PaperFormat, QuizAttemptsTask, Settings, StatusExtras, WorkerError,
    WorkerResult,
};

pub const BASE_URL: &str = "https://moodle.example";

/// Settings tuned for fast tests.
pub fn test_settings() -> Settings {
    Settings {
        status_reporting_interval: Duration::ZERO,
        backup_status_retry: Duration::from_millis(20),
        request_timeout: Duration::from_secs(5),
        ..Settings::default()
    }
}

/// A quiz attempts task over the given attempt ids.
pub fn attempts_task(attemptids: Vec<u64>) -> QuizAttemptsTask {
    QuizAttemptsTask {
        attemptids,
        sections: BTreeMap::from([
            ("header".to_string(), true),
            ("question".to_string(), true),
            ("attachments".to_string(), true),
        ]),
        fetch_metadata: true,
        fetch_attachments: true,
        paper_format: PaperFormat::A4,
        keep_html_files: false,
        foldername_pattern: "${attemptid} - ${username}".to_string(),
        filename_pattern: "attempt-${attemptid}".to_string(),
        image_optimize: None,
    }
}

/// Behaviour knobs for [`StubMoodleApi`], fixed at construction.
#[derive(Default)]
pub struct StubConfig {
    /// Backup status per poll; the last entry repeats forever.
    pub backup_sequence: Vec<BackupStatus>,
    /// Attachments announced per attempt id.
    pub attachments: HashMap<u64, Vec<AttemptAttachment>>,
    /// Bytes written for every stubbed download.
    pub download_bytes: Vec<u8>,
    /// Make downloads hang forever (cancellation tests).
    pub download_hang: bool,
    /// Copy uploaded artifacts here so tests can inspect them after the
    /// job's staging directory is gone.
    pub upload_copy_dir: Option<PathBuf>,
    /// Reported Content-Type for backup HEAD requests.
    pub backup_content_type: Option<String>,
}

impl StubConfig {
    pub fn with_defaults() -> Self {
        Self {
            backup_sequence: vec![BackupStatus::Success],
            download_bytes: b"stub-file-payload".to_vec(),
            backup_content_type: Some("application/vnd.moodle.backup".to_string()),
            ..Self::default()
        }
    }
}

/// Everything the stub observed during a job.
#[derive(Default)]
pub struct StubState {
    pub notifications: Vec<(JobStatus, Option<StatusExtras>)>,
    pub attempt_data_calls: Vec<u64>,
    pub backup_status_calls: Vec<String>,
    pub backup_poll_counts: HashMap<String, usize>,
    pub downloads: Vec<RecordedDownload>,
    pub uploaded_archive: Option<PathBuf>,
    pub uploaded_filename: Option<String>,
    pub processed_sha256: Option<String>,
}

pub struct RecordedDownload {
    pub url: String,
    pub target_dir: PathBuf,
    pub target_filename: String,
    pub expected_sha1: Option<String>,
    pub max_bytes: u64,
}

/// Scripted in-process host API.
pub struct StubMoodleApi {
    endpoints: MoodleEndpoints,
    pub config: StubConfig,
    pub state: Mutex<StubState>,
}

impl StubMoodleApi {
    pub fn new(config: StubConfig) -> Arc<Self> {
        let endpoints = MoodleEndpoints::new(
            BASE_URL,
            format!("{BASE_URL}/webservice/rest/server.php"),
            format!("{BASE_URL}/webservice/upload.php"),
            "opensesame",
        )
        .expect("valid stub endpoints");
        Arc::new(Self {
            endpoints,
            config,
            state: Mutex::new(StubState::default()),
        })
    }

    pub fn notified_statuses(&self) -> Vec<JobStatus> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .map(|(status, _)| *status)
            .collect()
    }
}

#[async_trait]
impl MoodleApi for StubMoodleApi {
    fn endpoints(&self) -> &MoodleEndpoints {
        &self.endpoints
    }

    async fn check_connection(&self) -> bool {
        true
    }

    async fn update_job_status(
        &self,
        _jobid: Uuid,
        _descriptor: &JobDescriptor,
        status: JobStatus,
        extras: Option<StatusExtras>,
    ) -> bool {
        self.state
            .lock()
            .unwrap()
            .notifications
            .push((status, extras));
        true
    }

    async fn get_attempts_metadata(
        &self,
        _jobid: Uuid,
        descriptor: &JobDescriptor,
    ) -> Result<Vec<MetadataRow>, WorkerError> {
        let task = descriptor.quiz_attempts().expect("attempts task");
        Ok(task
            .attemptids
            .iter()
            .map(|id| {
                let row = serde_json::json!({
                    "attemptid": id,
                    "userid": 100 + id,
                    "username": format!("student{id}"),
                    "firstname": "Jane",
                    "lastname": "Doe",
                    "timestart": 1_700_000_000u64 + id,
                    "timefinish": 1_700_003_600u64 + id,
                    "attempt": 1,
                    "state": "finished",
                });
                row.as_object().unwrap().clone()
            })
            .collect())
    }

    async fn get_attempt_data(
        &self,
        _jobid: Uuid,
        _descriptor: &JobDescriptor,
        attemptid: u64,
    ) -> Result<AttemptData, WorkerError> {
        self.state
            .lock()
            .unwrap()
            .attempt_data_calls
            .push(attemptid);
        Ok(AttemptData {
            foldername: format!("{attemptid} - student{attemptid}"),
            filename: format!("attempt-{attemptid}"),
            report: format!("<html><body><h1>Attempt {attemptid}</h1></body></html>"),
            attachments: self
                .config
                .attachments
                .get(&attemptid)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn get_backup_status(
        &self,
        _jobid: Uuid,
        _descriptor: &JobDescriptor,
        backupid: &str,
    ) -> Result<BackupStatus, WorkerError> {
        let mut state = self.state.lock().unwrap();
        state.backup_status_calls.push(backupid.to_string());
        let polls = state
            .backup_poll_counts
            .entry(backupid.to_string())
            .or_insert(0);
        let status = self
            .config
            .backup_sequence
            .get(*polls)
            .or_else(|| self.config.backup_sequence.last())
            .copied()
            .unwrap_or(BackupStatus::Success);
        *polls += 1;
        Ok(status)
    }

    async fn get_remote_file_metadata(
        &self,
        _download_url: &str,
    ) -> Result<RemoteFileMetadata, WorkerError> {
        Ok(RemoteFileMetadata {
            content_type: self.config.backup_content_type.clone(),
            content_length: Some(self.config.download_bytes.len() as u64),
        })
    }

    async fn download_moodle_file(
        &self,
        request: FileDownloadRequest<'_>,
    ) -> Result<u64, WorkerError> {
        if self.config.download_hang {
            // Record the target first so tests can check cleanup, then park
            // until the future is dropped by cancellation
            self.state.lock().unwrap().downloads.push(RecordedDownload {
                url: request.url.to_string(),
                target_dir: request.target_dir.to_path_buf(),
                target_filename: request.target_filename.to_string(),
                expected_sha1: request.expected_sha1.map(str::to_string),
                max_bytes: request.max_bytes,
            });
            std::future::pending::<()>().await;
            unreachable!();
        }

        tokio::fs::create_dir_all(request.target_dir).await?;
        tokio::fs::write(
            request.target_dir.join(request.target_filename),
            &self.config.download_bytes,
        )
        .await?;
        self.state.lock().unwrap().downloads.push(RecordedDownload {
            url: request.url.to_string(),
            target_dir: request.target_dir.to_path_buf(),
            target_filename: request.target_filename.to_string(),
            expected_sha1: request.expected_sha1.map(str::to_string),
            max_bytes: request.max_bytes,
        });
        Ok(self.config.download_bytes.len() as u64)
    }

    async fn upload_file(&self, file: &Path) -> Result<UploadedFile, WorkerError> {
        let mut state = self.state.lock().unwrap();
        state.uploaded_archive = Some(file.to_path_buf());
        state.uploaded_filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        if let Some(copy_dir) = &self.config.upload_copy_dir {
            std::fs::create_dir_all(copy_dir)?;
            std::fs::copy(file, copy_dir.join("uploaded-artifact"))?;
        }
        Ok(UploadedFile {
            component: "user".to_string(),
            contextid: 5,
            userid: 2,
            filearea: "draft".to_string(),
            filename: state.uploaded_filename.clone().unwrap_or_default(),
            filepath: "/".to_string(),
            itemid: 7,
        })
    }

    async fn process_uploaded_artifact(
        &self,
        _jobid: Uuid,
        _descriptor: &JobDescriptor,
        _upload: &UploadedFile,
        sha256sum: &str,
    ) -> Result<(), WorkerError> {
        self.state.lock().unwrap().processed_sha256 = Some(sha256sum.to_string());
        Ok(())
    }
}

/// Renderer double returning a fixed PDF payload.
pub struct StubRenderer {
    pub rendered: Arc<Mutex<Vec<String>>>,
    pub pdf_bytes: Vec<u8>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self {
            rendered: Arc::new(Mutex::new(Vec::new())),
            pdf_bytes: b"%PDF-1.7\nstub report body\n%%EOF\n".to_vec(),
        }
    }
}

#[async_trait]
impl ReportRenderer for StubRenderer {
    async fn open_session(&self, _base_url: &str) -> WorkerResult<Box<dyn RenderSession>> {
        Ok(Box::new(StubSession {
            rendered: Arc::clone(&self.rendered),
            pdf_bytes: self.pdf_bytes.clone(),
        }))
    }
}

pub struct StubSession {
    rendered: Arc<Mutex<Vec<String>>>,
    pdf_bytes: Vec<u8>,
}

#[async_trait]
impl RenderSession for StubSession {
    async fn render_report(
        &self,
        html: &str,
        _paper_format: PaperFormat,
    ) -> WorkerResult<Vec<u8>> {
        self.rendered.lock().unwrap().push(html.to_string());
        Ok(self.pdf_bytes.clone())
    }

    async fn close(self: Box<Self>) -> WorkerResult<()> {
        Ok(())
    }
}

/// Build a descriptor bound to the stub API.
pub fn descriptor(api: Arc<StubMoodleApi>) -> JobDescriptor {
    JobDescriptor::new(api, JobTarget::Task { taskid: 1 }, "quiz-archive").unwrap()
}
