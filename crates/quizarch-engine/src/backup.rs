//! Backup pipeline: poll the host until each backup is ready, then download.

use std::path::Path;

use futures_util::future::try_join_all;
use tokio_util::sync::CancellationToken;

use quizarch_core::ports::moodle::FileDownloadRequest;
use quizarch_core::{BackupStatus, MoodleBackupTask, WorkerError, WorkerResult};

use crate::job::{ensure_not_cancelled, ArchiveJob};

/// Expected content type of a finished backup.
const BACKUP_CONTENT_TYPE: &str = "application/vnd.moodle.backup";

/// Placeholder file contents written instead of real backups in demo mode.
const DEMO_PLACEHOLDER: &str = "!!!DEMO MODE!!!\r\nThis is a placeholder file for a Moodle backup.\r\n\r\nPlease disable demo mode to download the actual backups.";

/// Wait for and download all backups of the job.
///
/// Backups run concurrently as independent subtasks; the first failure drops
/// the remaining subtasks and surfaces its error, failing the job.
pub(crate) async fn process_moodle_backups(
    job: &ArchiveJob,
    workdir: &Path,
    cancel: &CancellationToken,
) -> WorkerResult<()> {
    let subtasks = job
        .descriptor()
        .moodle_backups()
        .iter()
        .map(|backup| process_moodle_backup(job, workdir, backup, cancel));

    try_join_all(subtasks).await?;
    Ok(())
}

/// Wait for a single backup to finish and download it.
async fn process_moodle_backup(
    job: &ArchiveJob,
    workdir: &Path,
    backup: &MoodleBackupTask,
    cancel: &CancellationToken,
) -> WorkerResult<()> {
    tracing::debug!(backupid = %backup.backupid, "Processing Moodle backup");
    let backups_dir = workdir.join("backups");

    if job.settings().demo_mode {
        tracing::info!(
            backupid = %backup.backupid,
            "Demo mode: Skipping download of backup. Replacing with placeholder ..."
        );
        tokio::fs::create_dir_all(&backups_dir).await?;
        tokio::fs::write(backups_dir.join(&backup.filename), DEMO_PLACEHOLDER).await?;
        return Ok(());
    }

    // Poll until the backup leaves the pending state
    loop {
        let status = job
            .descriptor()
            .moodle_api()
            .get_backup_status(job.id(), job.descriptor(), &backup.backupid)
            .await?;

        ensure_not_cancelled(cancel)?;

        match status {
            BackupStatus::Success => break,
            BackupStatus::Failed => {
                return Err(WorkerError::protocol(format!(
                    "Backup {} failed on the host side",
                    backup.backupid
                )));
            }
            BackupStatus::Pending => {}
        }

        tracing::info!(
            backupid = %backup.backupid,
            retry_sec = job.settings().backup_status_retry.as_secs(),
            "Backup not finished yet. Waiting before retrying ..."
        );
        job.enter_waiting_for_backup().await;

        tokio::select! {
            () = cancel.cancelled() => return Err(WorkerError::Cancelled),
            () = tokio::time::sleep(job.settings().backup_status_retry) => {}
        }
    }

    // Validate the download before streaming it
    let metadata = job
        .descriptor()
        .moodle_api()
        .get_remote_file_metadata(&backup.file_download_url)
        .await?;

    if metadata.content_type.as_deref() != Some(BACKUP_CONTENT_TYPE) {
        return Err(WorkerError::integrity(format!(
            "Backup Content-Type invalid. Expected \"{BACKUP_CONTENT_TYPE}\" but got \"{}\"",
            metadata.content_type.as_deref().unwrap_or("<none>")
        )));
    }

    let max_bytes = job.settings().backup_download_max_filesize_bytes;
    match metadata.content_length {
        None => tracing::warn!(
            "Backup filesize could not be determined because 'Content-Length' HTTP header is missing. Trying to download anyways ..."
        ),
        Some(length) if length > max_bytes => {
            return Err(WorkerError::integrity(format!(
                "Backup filesize of {length} bytes exceeds maximum allowed filesize {max_bytes} bytes"
            )));
        }
        Some(length) => tracing::debug!(backupid = %backup.backupid, bytes = length, "Backup filesize"),
    }

    // The download future is dropped when the stop flag fires, which aborts
    // the stream between chunks
    let downloaded_bytes = tokio::select! {
        () = cancel.cancelled() => return Err(WorkerError::Cancelled),
        result = job.descriptor().moodle_api().download_moodle_file(FileDownloadRequest {
            url: &backup.file_download_url,
            target_dir: &backups_dir,
            target_filename: &backup.filename,
            expected_sha1: None,
            max_bytes,
        }) => result?,
    };

    tracing::info!(
        bytes = downloaded_bytes,
        backupid = %backup.backupid,
        filename = %backup.filename,
        "Downloaded backup"
    );
    Ok(())
}
