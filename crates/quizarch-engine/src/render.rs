//! Per-attempt render pipeline.
//!
//! Fetches the attempt report from the host, materialises the attempt
//! artifact directory, drives the browser session to PDF, optionally
//! post-processes the PDF and downloads attachments. Attempts are processed
//! strictly sequentially; the stop flag is checked before each attempt and
//! before each attachment download.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use quizarch_core::names;
use quizarch_core::ports::moodle::FileDownloadRequest;
use quizarch_core::ports::RenderSession;
use quizarch_core::{QuizAttemptsTask, WorkerResult};

use crate::job::{ensure_not_cancelled, ArchiveJob, JobDeps};

/// Render every attempt of the job's quiz attempts task.
///
/// Fills `archived_attempts` with `attemptid → artifact stem path` entries
/// and reports rate-limited progress to the host.
pub(crate) async fn archive_attempts(
    job: &ArchiveJob,
    deps: &JobDeps,
    session: &dyn RenderSession,
    workdir: &Path,
    task: &QuizAttemptsTask,
    archived_attempts: &mut BTreeMap<u64, PathBuf>,
    cancel: &CancellationToken,
) -> WorkerResult<()> {
    let total = task.attemptids.len();

    for &attemptid in &task.attemptids {
        ensure_not_cancelled(cancel)?;

        let stem = archive_attempt(job, deps, session, workdir, task, attemptid, cancel).await?;
        archived_attempts.insert(attemptid, stem);

        job.report_render_progress(archived_attempts.len(), total)
            .await;
    }

    Ok(())
}

/// Render a single attempt and return its artifact stem path
/// (`attempts/<folder>/<stem>`, without extension).
async fn archive_attempt(
    job: &ArchiveJob,
    deps: &JobDeps,
    session: &dyn RenderSession,
    workdir: &Path,
    task: &QuizAttemptsTask,
    attemptid: u64,
    cancel: &CancellationToken,
) -> WorkerResult<PathBuf> {
    let descriptor = job.descriptor();
    let api = descriptor.moodle_api();

    let data = api.get_attempt_data(job.id(), descriptor, attemptid).await?;

    // The adapter already validated these; re-check before anything touches
    // the filesystem, since the names originate from the host.
    names::validate_folder_name(&data.foldername)?;
    names::validate_file_name(&data.filename)?;

    let attempt_dir = workdir.join("attempts").join(&data.foldername);
    tokio::fs::create_dir_all(&attempt_dir).await?;

    if task.keep_html_files {
        let html_path = attempt_dir.join(format!("{}.html", data.filename));
        tokio::fs::write(&html_path, &data.report).await?;
        tracing::debug!(attemptid, path = %html_path.display(), "Saved HTML DOM of quiz attempt");
    } else {
        tracing::debug!(attemptid, "Skipping HTML DOM saving of quiz attempt");
    }

    let pdf = session.render_report(&data.report, task.paper_format).await?;
    let pdf_path = attempt_dir.join(format!("{}.pdf", data.filename));
    tokio::fs::write(&pdf_path, &pdf).await?;
    tracing::info!("Generated \"{}\"", data.filename);

    if let Some(optimize) = task.image_optimize {
        deps.pdf_optimizer.optimize(&pdf_path, optimize).await?;
    }

    if !data.attachments.is_empty() {
        tracing::debug!(count = data.attachments.len(), "Saving attachments ...");
        for attachment in &data.attachments {
            ensure_not_cancelled(cancel)?;

            names::validate_file_name_with_extension(&attachment.filename)?;
            names::validate_file_name(&attachment.slot)?;

            let target_dir = attempt_dir.join("attachments").join(&attachment.slot);
            let downloaded_bytes = api
                .download_moodle_file(FileDownloadRequest {
                    url: &attachment.downloadurl,
                    target_dir: &target_dir,
                    target_filename: &attachment.filename,
                    expected_sha1: Some(&attachment.contenthash),
                    max_bytes: job
                        .settings()
                        .question_attachment_download_max_filesize_bytes,
                })
                .await?;

            tracing::info!(
                bytes = downloaded_bytes,
                slot = %attachment.slot,
                filename = %attachment.filename,
                "Downloaded quiz attempt attachment"
            );
        }
    }

    Ok(attempt_dir.join(&data.filename))
}
