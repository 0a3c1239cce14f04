//! SHA-256 hashing of the working directory tree.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use quizarch_core::WorkerResult;

use crate::job::ensure_not_cancelled;

/// Read chunk size for hashing.
const HASH_CHUNK_SIZE: usize = 4096;

/// SHA-256 of a file, lower-case hex.
pub async fn file_sha256_hex(path: &Path) -> WorkerResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Write a `<file>.sha256` sibling for every regular file under `root`.
///
/// The file list is snapshotted before hashing starts, so the written side
/// files are not hashed themselves. The stop flag is checked once per file.
pub async fn write_tree_hashes(root: &Path, cancel: &CancellationToken) -> WorkerResult<()> {
    let files = collect_regular_files(root).await?;

    for file in files {
        ensure_not_cancelled(cancel)?;

        let digest = file_sha256_hex(&file).await?;
        let mut side_file = OsString::from(file.into_os_string());
        side_file.push(".sha256");
        tokio::fs::write(PathBuf::from(side_file), digest).await?;
    }

    Ok(())
}

/// Recursively collect all regular files under `root`.
async fn collect_regular_files(root: &Path) -> WorkerResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sha256_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert_eq!(
            file_sha256_hex(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn tree_hashing_writes_side_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("attempts/a1"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("attempts/a1/report.pdf"), b"pdf")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("top.txt"), b"abc")
            .await
            .unwrap();

        write_tree_hashes(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let digest = tokio::fs::read_to_string(dir.path().join("top.txt.sha256"))
            .await
            .unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(dir.path().join("attempts/a1/report.pdf.sha256").exists());

        // Side files were not hashed themselves
        assert!(!dir.path().join("top.txt.sha256.sha256").exists());
    }

    #[tokio::test]
    async fn tree_hashing_observes_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("file.txt"), b"abc")
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = write_tree_hashes(dir.path(), &cancel).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
