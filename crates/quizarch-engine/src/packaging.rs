//! Final artifact packaging.
//!
//! The artifact is a gzip-compressed tape archive named
//! `<archive_filename>.tar.gz`, built under a fresh staging directory. All
//! entry paths are relative to the working directory: the archive has no
//! common root and can never contain absolute paths.

use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use quizarch_core::{WorkerError, WorkerResult};

/// File extension of the final artifact.
pub const ARTIFACT_EXTENSION: &str = "tar.gz";

/// Build the artifact from the working directory contents.
///
/// Returns the path of the archive below `staging_dir`.
pub async fn build_archive(
    workdir: &Path,
    staging_dir: &Path,
    archive_filename: &str,
) -> WorkerResult<PathBuf> {
    let archive_path = staging_dir.join(format!("{archive_filename}.{ARTIFACT_EXTENSION}"));

    let workdir = workdir.to_path_buf();
    let output = archive_path.clone();
    tokio::task::spawn_blocking(move || build_archive_sync(&workdir, &output))
        .await
        .map_err(|e| WorkerError::render(format!("Archive task failed: {e}")))??;

    Ok(archive_path)
}

fn build_archive_sync(workdir: &Path, output: &Path) -> WorkerResult<()> {
    let file = std::fs::File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut pending = vec![workdir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            let relative = path
                .strip_prefix(workdir)
                .map_err(|_| WorkerError::validation("Archive entry escaped the work directory"))?
                .to_path_buf();

            if file_type.is_dir() {
                builder.append_dir(&relative, &path)?;
                pending.push(path);
            } else if file_type.is_file() {
                builder.append_path_with_name(&path, &relative)?;
            }
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}
