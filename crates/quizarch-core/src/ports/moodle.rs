//! Host web-service API port.
//!
//! The engine talks to the learning-management host exclusively through
//! [`MoodleApi`]. Two adapter variants implement it (the legacy
//! `quiz_archiver` API and the task-based `archivingmod_quiz` API); the HTTP
//! layer picks the variant by endpoint and builds the adapter through a
//! [`MoodleApiFactory`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkerError;
use crate::job::descriptor::JobDescriptor;
use crate::job::status::{JobStatus, StatusExtras};
use crate::types::backup_status::BackupStatus;

/// Validated connection endpoints of one host instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodleEndpoints {
    base_url: String,
    ws_url: String,
    upload_url: String,
    wstoken: String,
}

impl MoodleEndpoints {
    /// Validate and create the endpoint set.
    pub fn new(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        upload_url: impl Into<String>,
        wstoken: impl Into<String>,
    ) -> Result<Self, WorkerError> {
        let base_url: String = base_url.into();
        let ws_url: String = ws_url.into();
        let upload_url: String = upload_url.into();
        let wstoken: String = wstoken.into();

        if base_url.is_empty() {
            return Err(WorkerError::validation("Base URL is required"));
        }
        if !base_url.starts_with("http") || base_url.ends_with(".php") {
            return Err(WorkerError::validation("Base URL is invalid"));
        }
        if ws_url.is_empty() {
            return Err(WorkerError::validation("Webservice REST base URL is required"));
        }
        if !ws_url.starts_with("http") || !ws_url.ends_with("/webservice/rest/server.php") {
            return Err(WorkerError::validation("Webservice REST base URL is invalid"));
        }
        if upload_url.is_empty() {
            return Err(WorkerError::validation("Webservice upload URL is required"));
        }
        if !upload_url.starts_with("http") || !upload_url.ends_with("/webservice/upload.php") {
            return Err(WorkerError::validation("Webservice upload URL is invalid"));
        }
        if wstoken.is_empty() {
            return Err(WorkerError::validation("wstoken is required"));
        }

        Ok(Self {
            base_url,
            ws_url,
            upload_url,
            wstoken,
        })
    }

    /// Base URL of the host instance (no trailing `.php`).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the web-service REST endpoint.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full URL of the web-service upload endpoint.
    #[must_use]
    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Opaque web-service token for this job.
    #[must_use]
    pub fn wstoken(&self) -> &str {
        &self.wstoken
    }
}

/// One attachment of a quiz attempt, as announced by the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptAttachment {
    /// Question slot the attachment belongs to.
    pub slot: String,
    /// Attachment filename.
    pub filename: String,
    /// Download URL on the host.
    pub downloadurl: String,
    /// Expected SHA-1 of the file contents.
    pub contenthash: String,
}

/// Attempt data returned by the host for a single attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptData {
    /// Folder name for the attempt artifact directory.
    pub foldername: String,
    /// File stem for the rendered report files.
    pub filename: String,
    /// The attempt report HTML DOM.
    pub report: String,
    /// Attachment metadata (empty unless attachments were requested).
    pub attachments: Vec<AttemptAttachment>,
}

/// One row of attempt metadata; columns are defined by the host.
pub type MetadataRow = serde_json::Map<String, serde_json::Value>;

/// `HEAD` metadata of a remote file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFileMetadata {
    /// `Content-Type` header value, if present.
    pub content_type: Option<String>,
    /// `Content-Length` header value, if present.
    pub content_length: Option<u64>,
}

/// Parameters for a streamed host file download.
#[derive(Debug)]
pub struct FileDownloadRequest<'a> {
    /// URL to download from.
    pub url: &'a str,
    /// Directory the file is written into (created if missing).
    pub target_dir: &'a Path,
    /// Filename to store the download as.
    pub target_filename: &'a str,
    /// Expected SHA-1 of the contents; verified after download when set.
    pub expected_sha1: Option<&'a str>,
    /// Hard cap on the number of downloaded bytes.
    pub max_bytes: u64,
}

/// Handle for a file uploaded to the host, echoed verbatim into the
/// processing callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub component: String,
    pub contextid: i64,
    pub userid: i64,
    pub filearea: String,
    pub filename: String,
    pub filepath: String,
    pub itemid: i64,
}

/// Adapter for the host web-service API.
#[async_trait]
pub trait MoodleApi: Send + Sync {
    /// The endpoints this adapter is bound to.
    fn endpoints(&self) -> &MoodleEndpoints;

    /// Probe the connection.
    ///
    /// A working token with missing function parameters makes the host answer
    /// with error code `invalidparameter`; that exact answer counts as
    /// success. Never fails hard.
    async fn check_connection(&self) -> bool;

    /// Report a job status to the host. Returns `false` on any failure;
    /// status updates are best-effort and must never block job progress.
    async fn update_job_status(
        &self,
        jobid: Uuid,
        descriptor: &JobDescriptor,
        status: JobStatus,
        extras: Option<StatusExtras>,
    ) -> bool;

    /// Fetch metadata rows for all attempts of the job, batched host-side
    /// into groups of 100 attempt ids.
    async fn get_attempts_metadata(
        &self,
        jobid: Uuid,
        descriptor: &JobDescriptor,
    ) -> Result<Vec<MetadataRow>, WorkerError>;

    /// Fetch the report HTML and attachment metadata for one attempt.
    async fn get_attempt_data(
        &self,
        jobid: Uuid,
        descriptor: &JobDescriptor,
        attemptid: u64,
    ) -> Result<AttemptData, WorkerError>;

    /// Query the status of a host backup.
    async fn get_backup_status(
        &self,
        jobid: Uuid,
        descriptor: &JobDescriptor,
        backupid: &str,
    ) -> Result<BackupStatus, WorkerError>;

    /// `HEAD` a host file URL.
    async fn get_remote_file_metadata(
        &self,
        download_url: &str,
    ) -> Result<RemoteFileMetadata, WorkerError>;

    /// Stream-download a host file. Returns the number of bytes written.
    async fn download_moodle_file(
        &self,
        request: FileDownloadRequest<'_>,
    ) -> Result<u64, WorkerError>;

    /// Upload a file via the multi-part upload endpoint.
    async fn upload_file(&self, file: &Path) -> Result<UploadedFile, WorkerError>;

    /// Invoke the processing callback for an uploaded artifact.
    async fn process_uploaded_artifact(
        &self,
        jobid: Uuid,
        descriptor: &JobDescriptor,
        upload: &UploadedFile,
        sha256sum: &str,
    ) -> Result<(), WorkerError>;
}

/// Supported host API variants, selected by request endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiVariant {
    /// Legacy `quiz_archiver` plugin API.
    QuizArchiver,
    /// Task-based `archivingmod_quiz` plugin API.
    ArchivingmodQuiz,
}

/// Factory building a host API adapter for a decoded request.
///
/// Injected into the HTTP layer so tests can substitute stub adapters.
pub trait MoodleApiFactory: Send + Sync {
    /// Build an adapter of the given variant for the given endpoints.
    fn create(
        &self,
        variant: ApiVariant,
        endpoints: MoodleEndpoints,
    ) -> Result<Arc<dyn MoodleApi>, WorkerError>;
}

/// Minimal in-process implementations for tests and wiring checks.
pub mod test_support {
    use super::*;

    /// A `MoodleApi` that accepts every call and returns empty data.
    ///
    /// Useful as a descriptor placeholder in unit tests that never execute a
    /// job against the host.
    #[derive(Debug)]
    pub struct NullMoodleApi {
        endpoints: MoodleEndpoints,
    }

    impl NullMoodleApi {
        /// Create a stub bound to `base_url`.
        ///
        /// # Panics
        /// Panics if `base_url` does not pass endpoint validation.
        #[must_use]
        pub fn new(base_url: &str) -> Self {
            let endpoints = MoodleEndpoints::new(
                base_url,
                format!("{base_url}/webservice/rest/server.php"),
                format!("{base_url}/webservice/upload.php"),
                "opensesame",
            )
            .expect("valid test endpoints");
            Self { endpoints }
        }
    }

    #[async_trait]
    impl MoodleApi for NullMoodleApi {
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
            _status: JobStatus,
            _extras: Option<StatusExtras>,
        ) -> bool {
            true
        }

        async fn get_attempts_metadata(
            &self,
            _jobid: Uuid,
            _descriptor: &JobDescriptor,
        ) -> Result<Vec<MetadataRow>, WorkerError> {
            Ok(Vec::new())
        }

        async fn get_attempt_data(
            &self,
            _jobid: Uuid,
            _descriptor: &JobDescriptor,
            attemptid: u64,
        ) -> Result<AttemptData, WorkerError> {
            Ok(AttemptData {
                foldername: format!("attempt-{attemptid}"),
                filename: format!("attempt-{attemptid}"),
                report: "<html><body></body></html>".to_string(),
                attachments: Vec::new(),
            })
        }

        async fn get_backup_status(
            &self,
            _jobid: Uuid,
            _descriptor: &JobDescriptor,
            _backupid: &str,
        ) -> Result<BackupStatus, WorkerError> {
            Ok(BackupStatus::Success)
        }

        async fn get_remote_file_metadata(
            &self,
            _download_url: &str,
        ) -> Result<RemoteFileMetadata, WorkerError> {
            Ok(RemoteFileMetadata {
                content_type: Some("application/vnd.moodle.backup".to_string()),
                content_length: None,
            })
        }

        async fn download_moodle_file(
            &self,
            _request: FileDownloadRequest<'_>,
        ) -> Result<u64, WorkerError> {
            Ok(0)
        }

        async fn upload_file(&self, _file: &Path) -> Result<UploadedFile, WorkerError> {
            Ok(UploadedFile {
                component: "user".to_string(),
                contextid: 1,
                userid: 1,
                filearea: "draft".to_string(),
                filename: "artifact".to_string(),
                filepath: "/".to_string(),
                itemid: 1,
            })
        }

        async fn process_uploaded_artifact(
            &self,
            _jobid: Uuid,
            _descriptor: &JobDescriptor,
            _upload: &UploadedFile,
            _sha256sum: &str,
        ) -> Result<(), WorkerError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_validate_url_shapes() {
        assert!(MoodleEndpoints::new(
            "https://moodle.example",
            "https://moodle.example/webservice/rest/server.php",
            "https://moodle.example/webservice/upload.php",
            "token",
        )
        .is_ok());

        // Base URL must not point at a script
        assert!(MoodleEndpoints::new(
            "https://moodle.example/index.php",
            "https://moodle.example/webservice/rest/server.php",
            "https://moodle.example/webservice/upload.php",
            "token",
        )
        .is_err());

        // Webservice URL must end with the REST server script
        assert!(MoodleEndpoints::new(
            "https://moodle.example",
            "https://moodle.example/webservice/rest.php",
            "https://moodle.example/webservice/upload.php",
            "token",
        )
        .is_err());

        // Upload URL must end with the upload script
        assert!(MoodleEndpoints::new(
            "https://moodle.example",
            "https://moodle.example/webservice/rest/server.php",
            "https://moodle.example/upload.php",
            "token",
        )
        .is_err());

        // Token is required
        assert!(MoodleEndpoints::new(
            "https://moodle.example",
            "https://moodle.example/webservice/rest/server.php",
            "https://moodle.example/webservice/upload.php",
            "",
        )
        .is_err());
    }
}
