//! Adapter for the legacy `quiz_archiver` Moodle plugin API.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use quizarch_core::ports::moodle::{
    FileDownloadRequest, MoodleApi, MoodleEndpoints, RemoteFileMetadata, UploadedFile,
};
use quizarch_core::{
    AttemptData, BackupStatus, JobDescriptor, JobStatus, JobTarget, MetadataRow, StatusExtras,
    WorkerError,
};

use crate::ws::{
    check_wsfunction_error, parse_attempt_data, parse_metadata_batch, WsClient,
    METADATA_BATCH_SIZE,
};

/// Webservice function that triggers a quiz attempt export.
const WSFUNCTION_ARCHIVE: &str = "quiz_archiver_generate_attempt_report";
/// Webservice function called after an artifact was uploaded successfully.
const WSFUNCTION_PROCESS_UPLOAD: &str = "quiz_archiver_process_uploaded_artifact";
/// Webservice function that reports the status of a backup.
const WSFUNCTION_GET_BACKUP: &str = "quiz_archiver_get_backup_status";
/// Webservice function that updates the status of a job.
const WSFUNCTION_UPDATE_JOB_STATUS: &str = "quiz_archiver_update_job_status";
/// Webservice function that retrieves attempt metadata.
const WSFUNCTION_GET_ATTEMPTS_METADATA: &str = "quiz_archiver_get_attempts_metadata";

/// Adapter for the legacy `quiz_archiver` plugin web-service API.
pub struct QuizArchiverApi {
    ws: WsClient,
}

impl QuizArchiverApi {
    /// Create the adapter from a prepared HTTP client and validated endpoints.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: MoodleEndpoints) -> Self {
        Self {
            ws: WsClient::new(http, endpoints),
        }
    }

    /// The legacy API addresses quizzes by the course/cm/quiz triple.
    fn quiz_target(descriptor: &JobDescriptor) -> Result<(u64, u64, u64), WorkerError> {
        match descriptor.target() {
            JobTarget::Quiz {
                courseid,
                cmid,
                quizid,
            } => Ok((courseid, cmid, quizid)),
            JobTarget::Task { .. } => Err(WorkerError::validation(
                "The quiz_archiver API requires courseid, cmid and quizid.",
            )),
        }
    }
}

#[async_trait]
impl MoodleApi for QuizArchiverApi {
    fn endpoints(&self) -> &MoodleEndpoints {
        self.ws.endpoints()
    }

    async fn check_connection(&self) -> bool {
        self.ws.check_connection(WSFUNCTION_UPDATE_JOB_STATUS).await
    }

    async fn update_job_status(
        &self,
        jobid: Uuid,
        _descriptor: &JobDescriptor,
        status: JobStatus,
        extras: Option<StatusExtras>,
    ) -> bool {
        let mut params = vec![
            ("jobid".to_string(), jobid.to_string()),
            ("status".to_string(), status.as_str().to_string()),
        ];
        if let Some(extras) = extras {
            match serde_json::to_string(&extras) {
                Ok(encoded) => params.push(("statusextras".to_string(), encoded)),
                Err(e) => tracing::warn!("Failed to encode statusextras: {e}"),
            }
        }

        let data = match self
            .ws
            .call_wsfunction(WSFUNCTION_UPDATE_JOB_STATUS, params, false)
            .await
        {
            Ok(data) => data,
            Err(_) => {
                tracing::warn!("Failed to update job status via Moodle API. Connection error.");
                return false;
            }
        };

        if data.get("status").and_then(Value::as_str) == Some("OK") {
            true
        } else {
            tracing::warn!("Moodle API rejected to update job status to new value: {status}");
            false
        }
    }

    async fn get_attempts_metadata(
        &self,
        _jobid: Uuid,
        descriptor: &JobDescriptor,
    ) -> Result<Vec<MetadataRow>, WorkerError> {
        let (courseid, cmid, quizid) = Self::quiz_target(descriptor)?;
        let task = descriptor.quiz_attempts().ok_or_else(|| {
            WorkerError::validation("Job has no quiz attempts task to fetch metadata for.")
        })?;

        let mut metadata = Vec::with_capacity(task.attemptids.len());
        for batch in task.attemptids.chunks(METADATA_BATCH_SIZE) {
            let mut params = vec![
                ("courseid".to_string(), courseid.to_string()),
                ("cmid".to_string(), cmid.to_string()),
                ("quizid".to_string(), quizid.to_string()),
            ];
            params.extend(
                batch
                    .iter()
                    .map(|id| ("attemptids[]".to_string(), id.to_string())),
            );

            let data = self
                .ws
                .call_wsfunction(WSFUNCTION_GET_ATTEMPTS_METADATA, params, false)
                .await?;
            metadata.extend(parse_metadata_batch(
                &data,
                WSFUNCTION_GET_ATTEMPTS_METADATA,
                Some((courseid, cmid, quizid)),
            )?);
            tracing::debug!(
                fetched = metadata.len(),
                total = task.attemptids.len(),
                "Fetched attempt metadata batch"
            );
        }

        Ok(metadata)
    }

    async fn get_attempt_data(
        &self,
        _jobid: Uuid,
        descriptor: &JobDescriptor,
        attemptid: u64,
    ) -> Result<AttemptData, WorkerError> {
        let (courseid, cmid, quizid) = Self::quiz_target(descriptor)?;
        let task = descriptor.quiz_attempts().ok_or_else(|| {
            WorkerError::validation("Job has no quiz attempts task to fetch data for.")
        })?;

        let mut params = vec![
            ("courseid".to_string(), courseid.to_string()),
            ("cmid".to_string(), cmid.to_string()),
            ("quizid".to_string(), quizid.to_string()),
            ("attemptid".to_string(), attemptid.to_string()),
            (
                "foldernamepattern".to_string(),
                task.foldername_pattern.clone(),
            ),
            ("filenamepattern".to_string(), task.filename_pattern.clone()),
            (
                "attachments".to_string(),
                if task.fetch_attachments { "1" } else { "0" }.to_string(),
            ),
        ];
        params.extend(task.sections.iter().map(|(name, enabled)| {
            (
                format!("sections[{name}]"),
                if *enabled { "1" } else { "0" }.to_string(),
            )
        }));

        let data = self
            .ws
            .call_wsfunction(WSFUNCTION_ARCHIVE, params, false)
            .await?;
        parse_attempt_data(&data, WSFUNCTION_ARCHIVE, attemptid)
    }

    async fn get_backup_status(
        &self,
        jobid: Uuid,
        _descriptor: &JobDescriptor,
        backupid: &str,
    ) -> Result<BackupStatus, WorkerError> {
        tracing::debug!(backupid, "Requesting backup status");
        let data = self
            .ws
            .call_wsfunction(
                WSFUNCTION_GET_BACKUP,
                vec![
                    ("jobid".to_string(), jobid.to_string()),
                    ("backupid".to_string(), backupid.to_string()),
                ],
                false,
            )
            .await
            .map_err(|_| {
                WorkerError::connectivity(format!(
                    "Failed to get status of backup {backupid} for job {jobid}"
                ))
            })?;
        check_wsfunction_error(&data, WSFUNCTION_GET_BACKUP)?;

        let status = data.get("status").and_then(Value::as_str).unwrap_or("");
        BackupStatus::from_wire(status).map_err(|other| {
            WorkerError::protocol(format!(
                "Retrieving status of backup \"{backupid}\" failed with {other}. Aborting."
            ))
        })
    }

    async fn get_remote_file_metadata(
        &self,
        download_url: &str,
    ) -> Result<RemoteFileMetadata, WorkerError> {
        self.ws.get_remote_file_metadata(download_url).await
    }

    async fn download_moodle_file(
        &self,
        request: FileDownloadRequest<'_>,
    ) -> Result<u64, WorkerError> {
        self.ws.download_moodle_file(request).await
    }

    async fn upload_file(&self, file: &Path) -> Result<UploadedFile, WorkerError> {
        self.ws.upload_file(file).await
    }

    async fn process_uploaded_artifact(
        &self,
        jobid: Uuid,
        _descriptor: &JobDescriptor,
        upload: &UploadedFile,
        sha256sum: &str,
    ) -> Result<(), WorkerError> {
        let params = vec![
            ("jobid".to_string(), jobid.to_string()),
            ("artifact_component".to_string(), upload.component.clone()),
            (
                "artifact_contextid".to_string(),
                upload.contextid.to_string(),
            ),
            ("artifact_userid".to_string(), upload.userid.to_string()),
            ("artifact_filearea".to_string(), upload.filearea.clone()),
            ("artifact_filename".to_string(), upload.filename.clone()),
            ("artifact_filepath".to_string(), upload.filepath.clone()),
            ("artifact_itemid".to_string(), upload.itemid.to_string()),
            ("artifact_sha256sum".to_string(), sha256sum.to_string()),
        ];

        let data = self
            .ws
            .call_wsfunction(WSFUNCTION_PROCESS_UPLOAD, params, true)
            .await
            .map_err(|_| {
                WorkerError::connectivity(format!(
                    "Failed to call upload processing hook \"{WSFUNCTION_PROCESS_UPLOAD}\" at \"{}\"",
                    self.ws.endpoints().ws_url()
                ))
            })?;
        check_wsfunction_error(&data, WSFUNCTION_PROCESS_UPLOAD)?;

        if data.get("status").and_then(Value::as_str) == Some("OK") {
            Ok(())
        } else {
            Err(WorkerError::protocol(format!(
                "Moodle webservice failed to process uploaded artifact with status: {:?}",
                data.get("status")
            )))
        }
    }
}
