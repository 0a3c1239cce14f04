//! Task-based `archivingmod_quiz` request envelope (nested, API version 1).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use quizarch_core::ports::moodle::{ApiVariant, MoodleApiFactory, MoodleEndpoints};
use quizarch_core::{JobDescriptor, JobTarget, QuizAttemptsTask};

use super::{check_api_version, DecodeError, ImageOptimizeField, Toggle};

/// Request envelope version this decoder accepts.
pub const API_VERSION: u64 = 1;

#[derive(Debug, Deserialize)]
struct Envelope {
    moodle_api: MoodleApiSection,
    taskid: u64,
    job: JobSection,
}

#[derive(Debug, Deserialize)]
struct MoodleApiSection {
    base_url: String,
    webservice_url: String,
    upload_url: String,
    wstoken: String,
}

#[derive(Debug, Deserialize)]
struct JobSection {
    archive_filename: String,
    attemptids: Vec<u64>,
    report_sections: BTreeMap<String, Toggle>,
    fetch_metadata: bool,
    fetch_attachments: bool,
    paper_format: String,
    keep_html_files: bool,
    foldername_pattern: String,
    filename_pattern: String,
    image_optimize: ImageOptimizeField,
}

/// Decode a task-based envelope into a job descriptor.
pub fn decode(
    payload: &Value,
    factory: &dyn MoodleApiFactory,
) -> Result<JobDescriptor, DecodeError> {
    check_api_version(payload, API_VERSION)?;

    let Envelope {
        moodle_api,
        taskid,
        job,
    } = serde_json::from_value(payload.clone()).map_err(|_| DecodeError::Incomplete)?;

    let endpoints = MoodleEndpoints::new(
        moodle_api.base_url,
        moodle_api.webservice_url,
        moodle_api.upload_url,
        moodle_api.wstoken,
    )?;
    let api = factory.create(ApiVariant::ArchivingmodQuiz, endpoints)?;

    let descriptor = JobDescriptor::new(
        api,
        JobTarget::Task { taskid },
        job.archive_filename.clone(),
    )?;

    let descriptor = descriptor.with_quiz_attempts(QuizAttemptsTask {
        attemptids: job.attemptids,
        sections: job
            .report_sections
            .iter()
            .map(|(name, toggle)| (name.clone(), toggle.as_bool()))
            .collect(),
        fetch_metadata: job.fetch_metadata,
        fetch_attachments: job.fetch_attachments,
        paper_format: job.paper_format.parse()?,
        keep_html_files: job.keep_html_files,
        foldername_pattern: job.foldername_pattern,
        filename_pattern: job.filename_pattern,
        image_optimize: job.image_optimize.into_option()?,
    })?;

    Ok(descriptor)
}
