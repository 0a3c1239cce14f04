//! Adapter for the task-based `archivingmod_quiz` Moodle plugin API.

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
const WSFUNCTION_ARCHIVE: &str = "archivingmod_quiz_generate_attempt_report";
/// Webservice function called after an artifact was uploaded successfully.
const WSFUNCTION_PROCESS_UPLOAD: &str = "archivingmod_quiz_process_uploaded_artifact";
/// Webservice function that updates the status of a task.
const WSFUNCTION_UPDATE_TASK_STATUS: &str = "archivingmod_quiz_update_task_status";
/// Webservice function that retrieves attempt metadata.
const WSFUNCTION_GET_ATTEMPTS_METADATA: &str = "archivingmod_quiz_get_attempts_metadata";

/// Translate a job status into the numeric activity archiving task state.
const fn task_status_code(status: JobStatus) -> u16 {
    match status {
        JobStatus::Uninitialized => 20,
        JobStatus::AwaitingProcessing => 40,
        JobStatus::Running => 100,
        JobStatus::WaitingForBackup | JobStatus::Finalizing => 200,
        JobStatus::Finished => 220,
        JobStatus::Failed => 250,
        JobStatus::Timeout => 251,
    }
}

/// Adapter for the task-based `archivingmod_quiz` plugin web-service API.
pub struct ArchivingmodQuizApi {
    ws: WsClient,
}

impl ArchivingmodQuizApi {
    /// Create the adapter from a prepared HTTP client and validated endpoints.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: MoodleEndpoints) -> Self {
        Self {
            ws: WsClient::new(http, endpoints),
        }
    }

    fn taskid(descriptor: &JobDescriptor) -> Result<u64, WorkerError> {
        match descriptor.target() {
            JobTarget::Task { taskid } => Ok(taskid),
            JobTarget::Quiz { .. } => Err(WorkerError::validation(
                "The archivingmod_quiz API requires a taskid.",
            )),
        }
    }
}

#[async_trait]
impl MoodleApi for ArchivingmodQuizApi {
    fn endpoints(&self) -> &MoodleEndpoints {
        self.ws.endpoints()
    }

    async fn check_connection(&self) -> bool {
        self.ws.check_connection(WSFUNCTION_UPDATE_TASK_STATUS).await
    }

    async fn update_job_status(
        &self,
        jobid: Uuid,
        descriptor: &JobDescriptor,
        status: JobStatus,
        extras: Option<StatusExtras>,
    ) -> bool {
        let taskid = match Self::taskid(descriptor) {
            Ok(taskid) => taskid,
            Err(e) => {
                tracing::warn!("Cannot report task status: {e}");
                return false;
            }
        };

        let taskstatus = task_status_code(status);
        tracing::debug!(%status, taskstatus, "Translating job status to task status");

        let mut params = vec![
            ("uuid".to_string(), jobid.to_string()),
            ("taskid".to_string(), taskid.to_string()),
            ("status".to_string(), taskstatus.to_string()),
        ];
        if let Some(progress) = extras.and_then(|e| e.progress) {
            params.push(("progress".to_string(), progress.to_string()));
        }

        let data = match self
            .ws
            .call_wsfunction(WSFUNCTION_UPDATE_TASK_STATUS, params, false)
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
        jobid: Uuid,
        descriptor: &JobDescriptor,
    ) -> Result<Vec<MetadataRow>, WorkerError> {
        let taskid = Self::taskid(descriptor)?;
        let task = descriptor.quiz_attempts().ok_or_else(|| {
            WorkerError::validation("Job has no quiz attempts task to fetch metadata for.")
        })?;

        let mut metadata = Vec::with_capacity(task.attemptids.len());
        for batch in task.attemptids.chunks(METADATA_BATCH_SIZE) {
            let mut params = vec![
                ("uuid".to_string(), jobid.to_string()),
                ("taskid".to_string(), taskid.to_string()),
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
            // The task-based API owns the target ids; no echo check possible
            metadata.extend(parse_metadata_batch(
                &data,
                WSFUNCTION_GET_ATTEMPTS_METADATA,
                None,
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
        jobid: Uuid,
        descriptor: &JobDescriptor,
        attemptid: u64,
    ) -> Result<AttemptData, WorkerError> {
        let taskid = Self::taskid(descriptor)?;
        let task = descriptor.quiz_attempts().ok_or_else(|| {
            WorkerError::validation("Job has no quiz attempts task to fetch data for.")
        })?;

        let mut params = vec![
            ("uuid".to_string(), jobid.to_string()),
            ("taskid".to_string(), taskid.to_string()),
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
        _jobid: Uuid,
        _descriptor: &JobDescriptor,
        _backupid: &str,
    ) -> Result<BackupStatus, WorkerError> {
        Err(WorkerError::protocol(
            "The archivingmod_quiz API does not support handling Moodle backups",
        ))
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
        descriptor: &JobDescriptor,
        upload: &UploadedFile,
        sha256sum: &str,
    ) -> Result<(), WorkerError> {
        let taskid = Self::taskid(descriptor)?;
        let params = vec![
            ("uuid".to_string(), jobid.to_string()),
            ("taskid".to_string(), taskid.to_string()),
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
