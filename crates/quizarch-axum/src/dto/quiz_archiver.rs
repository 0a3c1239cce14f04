//! Legacy `quiz_archiver` request envelope (flat, API version 7).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use quizarch_core::ports::moodle::{ApiVariant, MoodleApiFactory, MoodleEndpoints};
use quizarch_core::{JobDescriptor, JobTarget, MoodleBackupTask, QuizAttemptsTask};

use super::{check_api_version, DecodeError, ImageOptimizeField, Toggle};

/// Request envelope version this decoder accepts.
pub const API_VERSION: u64 = 7;

#[derive(Debug, Deserialize)]
struct Envelope {
    moodle_base_url: String,
    moodle_ws_url: String,
    moodle_upload_url: String,
    wstoken: String,
    courseid: u64,
    cmid: u64,
    quizid: u64,
    archive_filename: String,
    task_archive_quiz_attempts: Option<AttemptsSection>,
    task_moodle_backups: Option<Vec<BackupEntry>>,
}

#[derive(Debug, Deserialize)]
struct AttemptsSection {
    attemptids: Vec<u64>,
    sections: BTreeMap<String, Toggle>,
    fetch_metadata: bool,
    paper_format: String,
    keep_html_files: bool,
    foldername_pattern: String,
    filename_pattern: String,
    image_optimize: ImageOptimizeField,
}

#[derive(Debug, Deserialize)]
struct BackupEntry {
    backupid: String,
    filename: String,
    file_download_url: String,
}

/// Decode a legacy envelope into a job descriptor.
pub fn decode(
    payload: &Value,
    factory: &dyn MoodleApiFactory,
) -> Result<JobDescriptor, DecodeError> {
    check_api_version(payload, API_VERSION)?;

    let envelope: Envelope =
        serde_json::from_value(payload.clone()).map_err(|_| DecodeError::Incomplete)?;

    let endpoints = MoodleEndpoints::new(
        envelope.moodle_base_url,
        envelope.moodle_ws_url,
        envelope.moodle_upload_url,
        envelope.wstoken,
    )?;
    let api = factory.create(ApiVariant::QuizArchiver, endpoints)?;

    let mut descriptor = JobDescriptor::new(
        api,
        JobTarget::Quiz {
            courseid: envelope.courseid,
            cmid: envelope.cmid,
            quizid: envelope.quizid,
        },
        envelope.archive_filename,
    )?;

    if let Some(task) = envelope.task_archive_quiz_attempts {
        // This envelope has no dedicated attachment flag; the `attachments`
        // report section decides
        let fetch_attachments = task
            .sections
            .get("attachments")
            .map(Toggle::as_bool)
            .unwrap_or(false);

        descriptor = descriptor.with_quiz_attempts(QuizAttemptsTask {
            attemptids: task.attemptids,
            sections: task
                .sections
                .iter()
                .map(|(name, toggle)| (name.clone(), toggle.as_bool()))
                .collect(),
            fetch_metadata: task.fetch_metadata,
            fetch_attachments,
            paper_format: task.paper_format.parse()?,
            keep_html_files: task.keep_html_files,
            foldername_pattern: task.foldername_pattern,
            filename_pattern: task.filename_pattern,
            image_optimize: task.image_optimize.into_option()?,
        })?;
    }

    if let Some(backups) = envelope.task_moodle_backups {
        for backup in backups {
            descriptor.add_moodle_backup(MoodleBackupTask {
                backupid: backup.backupid,
                filename: backup.filename,
                file_download_url: backup.file_download_url,
            })?;
        }
    }

    Ok(descriptor)
}
