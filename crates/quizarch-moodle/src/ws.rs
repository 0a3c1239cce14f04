//! Shared Moodle web-service plumbing.
//!
//! Both API variants delegate here for everything that is not
//! variant-specific: parameter assembly, lenient JSON decoding, error
//! envelope checks, the connection probe, HEAD metadata, streamed file
//! downloads and the multi-part upload.

use std::path::Path;

use serde_json::Value;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use quizarch_core::ports::moodle::{
    FileDownloadRequest, MoodleEndpoints, RemoteFileMetadata, UploadedFile,
};
use quizarch_core::WorkerError;

use crate::client::{REQUEST_TIMEOUT, REQUEST_TIMEOUT_EXTENDED};

/// Keys that must be present for each file in a Moodle upload response.
const UPLOAD_FILE_FIELDS: [&str; 7] = [
    "component",
    "contextid",
    "userid",
    "filearea",
    "filename",
    "filepath",
    "itemid",
];

/// Downloads smaller than this are sniffed for a JSON error envelope.
const ERROR_SNIFF_MAX_BYTES: u64 = 10 * 1024;

/// Chunk size for hashing downloaded files.
const HASH_CHUNK_SIZE: usize = 4096;

/// Shared web-service client used by both adapter variants.
#[derive(Clone)]
pub(crate) struct WsClient {
    http: reqwest::Client,
    endpoints: MoodleEndpoints,
}

impl WsClient {
    pub(crate) fn new(http: reqwest::Client, endpoints: MoodleEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub(crate) fn endpoints(&self) -> &MoodleEndpoints {
        &self.endpoints
    }

    /// Call a web-service function with the standard token/format parameters.
    ///
    /// `long` selects the extended read timeout for long-running functions.
    pub(crate) async fn call_wsfunction(
        &self,
        wsfunction: &str,
        params: Vec<(String, String)>,
        long: bool,
    ) -> Result<Value, WorkerError> {
        let mut query: Vec<(String, String)> = vec![
            ("wstoken".to_string(), self.endpoints.wstoken().to_string()),
            ("moodlewsrestformat".to_string(), "json".to_string()),
            ("wsfunction".to_string(), wsfunction.to_string()),
        ];
        query.extend(params);

        let timeout = if long {
            REQUEST_TIMEOUT_EXTENDED
        } else {
            REQUEST_TIMEOUT
        };

        let response = self
            .http
            .get(self.endpoints.ws_url())
            .query(&query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(wsfunction, error = %e, "Moodle webservice call failed");
                WorkerError::connectivity(format!(
                    "Call to Moodle webservice function {wsfunction} at \"{}\" failed",
                    self.endpoints.ws_url()
                ))
            })?;

        let text = response.text().await.map_err(|_| {
            WorkerError::connectivity(format!(
                "Call to Moodle webservice function {wsfunction} at \"{}\" failed",
                self.endpoints.ws_url()
            ))
        })?;

        serde_json::from_str(strip_html_wrapper(&text)).map_err(|_| {
            tracing::debug!(wsfunction, response = %text, "Moodle webservice returned invalid JSON");
            WorkerError::protocol(format!(
                "Call to Moodle webservice function {wsfunction} at \"{}\" returned invalid JSON",
                self.endpoints.ws_url()
            ))
        })
    }

    /// Probe the connection by invoking `wsfunction` without its required
    /// parameters; the host answering `invalidparameter` proves both
    /// reachability and token validity.
    pub(crate) async fn check_connection(&self, wsfunction: &str) -> bool {
        let data = match self.call_wsfunction(wsfunction, Vec::new(), false).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Moodle API connection check failed: {e}");
                return false;
            }
        };

        if data.get("errorcode").and_then(Value::as_str) == Some("invalidparameter") {
            true
        } else {
            tracing::warn!(
                "Moodle API connection check failed with Moodle error: {:?}",
                data.get("errorcode")
            );
            false
        }
    }

    /// `HEAD` a host file URL, passing the file API token.
    pub(crate) async fn get_remote_file_metadata(
        &self,
        download_url: &str,
    ) -> Result<RemoteFileMetadata, WorkerError> {
        tracing::debug!(url = download_url, "Requesting HEAD for file");
        let response = self
            .http
            .head(download_url)
            .query(&[("token", self.endpoints.wstoken())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                WorkerError::connectivity(format!(
                    "Failed to retrieve HEAD for remote file at: {download_url}. {e}"
                ))
            })?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(RemoteFileMetadata {
            content_type,
            content_length,
        })
    }

    /// Stream-download a host file to disk, enforcing the size cap between
    /// chunks, sniffing small downloads for JSON error envelopes and
    /// verifying the SHA-1 checksum when one is expected.
    pub(crate) async fn download_moodle_file(
        &self,
        request: FileDownloadRequest<'_>,
    ) -> Result<u64, WorkerError> {
        let target_file = request.target_dir.join(request.target_filename);
        tokio::fs::create_dir_all(request.target_dir).await?;

        let mut response = self
            .http
            .get(request.url)
            .query(&[
                ("token", self.endpoints.wstoken()),
                ("forcedownload", "1"),
            ])
            .timeout(REQUEST_TIMEOUT_EXTENDED)
            .send()
            .await
            .map_err(|_| {
                WorkerError::connectivity(format!(
                    "Failed to download Moodle file from: {}",
                    request.url
                ))
            })?;

        let mut file = tokio::fs::File::create(&target_file).await?;
        let mut downloaded_bytes: u64 = 0;
        loop {
            let chunk = response.chunk().await.map_err(|_| {
                WorkerError::connectivity(format!(
                    "Failed to download Moodle file from: {}",
                    request.url
                ))
            })?;
            let Some(chunk) = chunk else { break };

            if downloaded_bytes > request.max_bytes {
                return Err(WorkerError::integrity(format!(
                    "Downloaded Moodle file was larger than expected and exceeded the maximum file size limit of {} bytes",
                    request.max_bytes
                )));
            }
            file.write_all(&chunk).await?;
            downloaded_bytes += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        // A tiny download is likely a JSON error message instead of the file
        if downloaded_bytes < ERROR_SNIFF_MAX_BYTES {
            if let Ok(body) = tokio::fs::read_to_string(&target_file).await {
                if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(&body) {
                    if data.contains_key("errorcode") && data.contains_key("debuginfo") {
                        tracing::debug!(response = %body, "Downloaded JSON error response");
                        return Err(WorkerError::protocol(format!(
                            "Moodle file download failed with \"{}\"",
                            data.get("errorcode")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                        )));
                    }
                }
            }
        }

        if let Some(expected) = request.expected_sha1 {
            let actual = sha1_file_hex(&target_file).await?;
            if actual != expected.to_ascii_lowercase() {
                return Err(WorkerError::integrity(format!(
                    "Moodle file download failed. Expected SHA1 sum \"{expected}\" but got \"{actual}\""
                )));
            }
        }

        tracing::info!(
            bytes = downloaded_bytes,
            target = %target_file.display(),
            "Downloaded Moodle file"
        );
        Ok(downloaded_bytes)
    }

    /// Upload a file via the multi-part upload endpoint and return the
    /// upload handle the host assigned to it.
    pub(crate) async fn upload_file(&self, file: &Path) -> Result<UploadedFile, WorkerError> {
        let metadata = tokio::fs::metadata(file).await?;
        tracing::info!(
            file = %file.display(),
            size = metadata.len(),
            url = self.endpoints.upload_url(),
            "Uploading file"
        );

        let handle = tokio::fs::File::open(file).await?;
        let stream = tokio_util::io::ReaderStream::new(handle);
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let part =
            reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(stream), metadata.len())
                .file_name(filename);
        let form = reqwest::multipart::Form::new()
            .text("token", self.endpoints.wstoken().to_string())
            .text("filepath", "/")
            .text("itemid", "0")
            .part("file_1", part);

        let response = self
            .http
            .post(self.endpoints.upload_url())
            .multipart(form)
            .timeout(REQUEST_TIMEOUT_EXTENDED)
            .send()
            .await
            .map_err(|e| {
                WorkerError::connectivity(format!(
                    "Failed to upload file to \"{}\". {e}",
                    self.endpoints.upload_url()
                ))
            })?;

        let data: Value = response.json().await.map_err(|e| {
            WorkerError::connectivity(format!(
                "Failed to upload file to \"{}\". {e}",
                self.endpoints.upload_url()
            ))
        })?;

        if let Value::Object(object) = &data {
            if object.contains_key("errorcode") && object.contains_key("debuginfo") {
                tracing::debug!(response = %data, "Upload error response");
                return Err(WorkerError::protocol(format!(
                    "Moodle webservice upload returned error \"{}\". Message: {}",
                    object.get("errorcode").and_then(Value::as_str).unwrap_or(""),
                    object.get("debuginfo").and_then(Value::as_str).unwrap_or("")
                )));
            }
        }

        let first = data
            .as_array()
            .and_then(|files| files.first())
            .ok_or_else(|| {
                WorkerError::protocol("Moodle webservice upload returned an invalid response")
            })?;

        let complete = first
            .as_object()
            .is_some_and(|object| UPLOAD_FILE_FIELDS.iter().all(|key| object.contains_key(*key)));
        if !complete {
            tracing::debug!(response = %data, "Incomplete upload response");
            return Err(WorkerError::protocol(
                "Moodle webservice upload returned an invalid response",
            ));
        }

        serde_json::from_value(first.clone()).map_err(|_| {
            WorkerError::protocol("Moodle webservice upload returned an invalid response")
        })
    }
}

/// Strip the `<html><body>`/`</body></html>` wrapper some Moodle 4.3 versions
/// put around web-service JSON responses.
pub(crate) fn strip_html_wrapper(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("<html><body>").unwrap_or(text);
    text.strip_suffix("</body></html>").unwrap_or(text)
}

/// Check a web-service response for the Moodle error envelope.
pub(crate) fn check_wsfunction_error(data: &Value, wsfunction: &str) -> Result<(), WorkerError> {
    let Some(object) = data.as_object() else {
        return Ok(());
    };
    let Some(errorcode) = object.get("errorcode") else {
        return Ok(());
    };
    let errorcode = errorcode.as_str().unwrap_or("unknown");

    if let Some(debuginfo) = object.get("debuginfo").and_then(Value::as_str) {
        return Err(WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned error \"{errorcode}\". Message: {debuginfo}"
        )));
    }
    if let Some(message) = object.get("message").and_then(Value::as_str) {
        return Err(WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned error \"{errorcode}\". Message: {message}"
        )));
    }
    Err(WorkerError::protocol(format!(
        "Moodle webservice function {wsfunction} returned error \"{errorcode}\"."
    )))
}

/// Parse and validate an attempt-data response shared by both API variants.
///
/// Checks the error envelope, the presence and types of all members, that the
/// echoed attempt id matches, and that the host-supplied folder and file
/// names pass the forbidden-character checks.
pub(crate) fn parse_attempt_data(
    data: &Value,
    wsfunction: &str,
    attemptid: u64,
) -> Result<quizarch_core::AttemptData, WorkerError> {
    use quizarch_core::ports::moodle::AttemptAttachment;

    check_wsfunction_error(data, wsfunction)?;

    let incomplete = || {
        WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned an incomplete response"
        ))
    };
    let invalid = || {
        WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned an invalid response"
        ))
    };

    let object = data.as_object().ok_or_else(invalid)?;
    for attr in ["attemptid", "foldername", "filename", "report", "attachments"] {
        if !object.contains_key(attr) {
            tracing::debug!(attr, "Missing attribute in attempt data response");
            return Err(incomplete());
        }
    }

    if object.get("attemptid").and_then(Value::as_u64) != Some(attemptid) {
        return Err(invalid());
    }
    let foldername = object
        .get("foldername")
        .and_then(Value::as_str)
        .ok_or_else(invalid)?;
    let filename = object
        .get("filename")
        .and_then(Value::as_str)
        .ok_or_else(invalid)?;
    let report = object
        .get("report")
        .and_then(Value::as_str)
        .ok_or_else(invalid)?;
    let raw_attachments = object
        .get("attachments")
        .and_then(Value::as_array)
        .ok_or_else(invalid)?;

    quizarch_core::names::validate_folder_name(foldername).map_err(|_| {
        WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned an invalid foldername"
        ))
    })?;
    quizarch_core::names::validate_file_name(filename).map_err(|_| {
        WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned an invalid filename"
        ))
    })?;

    let mut attachments = Vec::with_capacity(raw_attachments.len());
    for raw in raw_attachments {
        let entry = raw.as_object().ok_or_else(invalid)?;
        let string_of = |key: &str| -> Result<String, WorkerError> {
            match entry.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(invalid()),
            }
        };
        attachments.push(AttemptAttachment {
            slot: string_of("slot")?,
            filename: string_of("filename")?,
            downloadurl: string_of("downloadurl")?,
            contenthash: string_of("contenthash")?,
        });
    }

    Ok(quizarch_core::AttemptData {
        foldername: foldername.to_string(),
        filename: filename.to_string(),
        report: report.to_string(),
        attachments,
    })
}

/// Validate one attempts-metadata batch response and return its rows.
pub(crate) fn parse_metadata_batch(
    data: &Value,
    wsfunction: &str,
    expected_echo: Option<(u64, u64, u64)>,
) -> Result<Vec<quizarch_core::MetadataRow>, WorkerError> {
    check_wsfunction_error(data, wsfunction)?;

    let object = data.as_object().ok_or_else(|| {
        WorkerError::protocol(format!(
            "Moodle webservice function {wsfunction} returned an incomplete response"
        ))
    })?;
    for attr in ["attempts", "cmid", "courseid", "quizid"] {
        if !object.contains_key(attr) {
            return Err(WorkerError::protocol(format!(
                "Moodle webservice function {wsfunction} returned an incomplete response"
            )));
        }
    }

    if let Some((courseid, cmid, quizid)) = expected_echo {
        let echoed = (
            object.get("courseid").and_then(Value::as_u64),
            object.get("cmid").and_then(Value::as_u64),
            object.get("quizid").and_then(Value::as_u64),
        );
        if echoed != (Some(courseid), Some(cmid), Some(quizid)) {
            return Err(WorkerError::protocol(format!(
                "Moodle webservice function {wsfunction} returned an invalid response"
            )));
        }
    }

    let rows = object
        .get("attempts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            WorkerError::protocol(format!(
                "Moodle webservice function {wsfunction} returned an invalid response"
            ))
        })?;

    rows.iter()
        .map(|row| {
            row.as_object().cloned().ok_or_else(|| {
                WorkerError::protocol(format!(
                    "Moodle webservice function {wsfunction} returned an invalid response"
                ))
            })
        })
        .collect()
}

/// Batch size for attempts-metadata requests; bounded by the maximum URL
/// length the Moodle web service accepts.
pub(crate) const METADATA_BATCH_SIZE: usize = 100;

/// SHA-1 of a file, lower-case hex, read in 4 KiB chunks.
async fn sha1_file_hex(path: &Path) -> Result<String, WorkerError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_wrapper_is_stripped() {
        assert_eq!(
            strip_html_wrapper("<html><body>{\"a\":1}</body></html>"),
            "{\"a\":1}"
        );
        assert_eq!(strip_html_wrapper("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_html_wrapper("  {\"a\":1}\n"), "{\"a\":1}");
        // One-sided wrappers are stripped independently
        assert_eq!(strip_html_wrapper("{\"a\":1}</body></html>"), "{\"a\":1}");
    }

    #[test]
    fn error_envelope_variants() {
        let with_debuginfo = serde_json::json!({
            "errorcode": "invalidtoken",
            "debuginfo": "token expired"
        });
        let err = check_wsfunction_error(&with_debuginfo, "test_fn").unwrap_err();
        assert!(err.to_string().contains("invalidtoken"));
        assert!(err.to_string().contains("token expired"));

        let with_message = serde_json::json!({
            "errorcode": "accessdenied",
            "message": "no capability"
        });
        let err = check_wsfunction_error(&with_message, "test_fn").unwrap_err();
        assert!(err.to_string().contains("no capability"));

        let bare = serde_json::json!({"errorcode": "mystery"});
        assert!(check_wsfunction_error(&bare, "test_fn").is_err());

        let ok = serde_json::json!({"status": "OK"});
        assert!(check_wsfunction_error(&ok, "test_fn").is_ok());
    }

    fn attempt_data_json() -> Value {
        serde_json::json!({
            "attemptid": 42,
            "foldername": "42 - John Doe",
            "filename": "attempt-42",
            "report": "<html><body>report</body></html>",
            "attachments": [
                {
                    "slot": 3,
                    "filename": "essay.pdf",
                    "downloadurl": "https://moodle.example/pluginfile.php/essay.pdf",
                    "contenthash": "a9993e364706816aba3e25717850c26c9cd0d89d"
                }
            ]
        })
    }

    #[test]
    fn attempt_data_parses_and_normalizes_slot() {
        let data = parse_attempt_data(&attempt_data_json(), "fn", 42).unwrap();
        assert_eq!(data.foldername, "42 - John Doe");
        assert_eq!(data.attachments.len(), 1);
        assert_eq!(data.attachments[0].slot, "3");
    }

    #[test]
    fn attempt_data_rejects_wrong_attempt_echo() {
        assert!(parse_attempt_data(&attempt_data_json(), "fn", 43).is_err());
    }

    #[test]
    fn attempt_data_rejects_missing_member() {
        let mut data = attempt_data_json();
        data.as_object_mut().unwrap().remove("report");
        assert!(parse_attempt_data(&data, "fn", 42).is_err());
    }

    #[test]
    fn attempt_data_rejects_forbidden_names() {
        let mut data = attempt_data_json();
        data["foldername"] = Value::String("../escape".to_string());
        assert!(parse_attempt_data(&data, "fn", 42).is_err());

        let mut data = attempt_data_json();
        data["foldername"] = Value::String("/leading".to_string());
        assert!(parse_attempt_data(&data, "fn", 42).is_err());

        let mut data = attempt_data_json();
        data["filename"] = Value::String("a/b".to_string());
        assert!(parse_attempt_data(&data, "fn", 42).is_err());
    }

    #[test]
    fn metadata_batch_checks_echo() {
        let data = serde_json::json!({
            "courseid": 1, "cmid": 2, "quizid": 3,
            "attempts": [{"attemptid": 10, "userid": 20}]
        });
        let rows = parse_metadata_batch(&data, "fn", Some((1, 2, 3))).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("attemptid"), Some(&Value::from(10)));

        assert!(parse_metadata_batch(&data, "fn", Some((1, 2, 99))).is_err());
    }

    #[tokio::test]
    async fn sha1_hashing_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert_eq!(
            sha1_file_hex(&path).await.unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
