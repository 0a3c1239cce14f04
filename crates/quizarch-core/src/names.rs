//! Validation of names that end up on disk.
//!
//! The host supplies attempt folder names, attempt file stems, attachment
//! names and backup filenames. None of them are trusted: everything is checked
//! against the forbidden character sets below before any path is built.

use crate::error::WorkerError;

/// Characters that are forbidden inside an attempt folder name.
pub const FOLDERNAME_FORBIDDEN_CHARACTERS: [char; 12] = [
    '\\', '.', ':', ';', '*', '?', '!', '"', '<', '>', '|', '\0',
];

/// Characters that are forbidden inside a file name (folder set plus `/`).
pub const FILENAME_FORBIDDEN_CHARACTERS: [char; 13] = [
    '\\', '.', ':', ';', '*', '?', '!', '"', '<', '>', '|', '\0', '/',
];

/// Validate a folder name received from the host.
///
/// Rejects forbidden characters as well as leading or trailing `/`.
pub fn validate_folder_name(name: &str) -> Result<(), WorkerError> {
    if name.is_empty() {
        return Err(WorkerError::validation("Folder name must not be empty."));
    }
    if name.contains(FOLDERNAME_FORBIDDEN_CHARACTERS) {
        return Err(WorkerError::validation(format!(
            "Folder name \"{name}\" contains forbidden characters."
        )));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(WorkerError::validation(format!(
            "Folder name \"{name}\" must not start or end with a slash."
        )));
    }
    Ok(())
}

/// Validate a file name received from the host.
///
/// Note that `.` is forbidden; file stems are combined with a worker-chosen
/// extension only after validation.
pub fn validate_file_name(name: &str) -> Result<(), WorkerError> {
    if name.is_empty() {
        return Err(WorkerError::validation("File name must not be empty."));
    }
    if name.contains(FILENAME_FORBIDDEN_CHARACTERS) {
        return Err(WorkerError::validation(format!(
            "File name \"{name}\" contains forbidden characters."
        )));
    }
    Ok(())
}

/// Validate a file name that carries its extension (e.g. backup filenames).
///
/// Same character set as [`validate_file_name`] except that `.` is allowed.
pub fn validate_file_name_with_extension(name: &str) -> Result<(), WorkerError> {
    if name.is_empty() {
        return Err(WorkerError::validation("File name must not be empty."));
    }
    if name
        .chars()
        .any(|c| c != '.' && FILENAME_FORBIDDEN_CHARACTERS.contains(&c))
    {
        return Err(WorkerError::validation(format!(
            "File name \"{name}\" contains forbidden characters."
        )));
    }
    if name.contains("..") || name.starts_with('.') {
        return Err(WorkerError::validation(format!(
            "File name \"{name}\" contains a forbidden dot sequence."
        )));
    }
    Ok(())
}

/// Validate the archive filename from the incoming request.
///
/// A bare filename: no path separators, no control characters, none of the
/// forbidden characters, not empty. The artifact extension is appended by the
/// packaging step later.
pub fn validate_archive_filename(name: &str) -> Result<(), WorkerError> {
    if name.is_empty() {
        return Err(WorkerError::validation("Archive filename is invalid."));
    }
    if name.contains(['/', '\\']) {
        return Err(WorkerError::validation(
            "Archive filename must not contain a path.",
        ));
    }
    if name.contains(['\0', ':', '*', '?', '"', '<', '>', '|', '.']) || name.chars().any(char::is_control)
    {
        return Err(WorkerError::validation(
            "Archive filename contains forbidden characters.",
        ));
    }
    Ok(())
}
