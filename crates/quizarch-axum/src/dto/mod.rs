//! Request envelope decoding.
//!
//! Two versioned request shapes exist, selected by endpoint: the legacy flat
//! `quiz_archiver` envelope and the task-based `archivingmod_quiz` envelope.
//! Both decode into the same internal [`JobDescriptor`].

use serde::Deserialize;
use serde_json::Value;

use quizarch_core::{ImageOptimize, WorkerError};

pub mod archivingmod;
pub mod quiz_archiver;

/// Why an envelope failed to decode.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Members missing or of the wrong shape.
    Incomplete,
    /// Values present but semantically invalid (includes version mismatch).
    Invalid(String),
}

impl From<WorkerError> for DecodeError {
    fn from(err: WorkerError) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// Check the envelope's `api_version` member against the expected version.
pub(crate) fn check_api_version(payload: &Value, expected: u64) -> Result<(), DecodeError> {
    let Some(version) = payload.get("api_version") else {
        return Err(DecodeError::Invalid(
            "API version missing in request payload".to_string(),
        ));
    };
    let Some(version) = version.as_u64() else {
        return Err(DecodeError::Invalid(
            "API version must be an integer".to_string(),
        ));
    };
    if version != expected {
        return Err(DecodeError::Invalid(format!(
            "API version mismatch. Expected: {expected}, Got: {version}. Please update your quiz-archive-worker!"
        )));
    }
    Ok(())
}

/// Boolean toggle that tolerates the encodings hosts actually send
/// (`true`, `1`, `"1"`, `"true"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Toggle {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Toggle {
    pub(crate) fn as_bool(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Text(value) => matches!(value.as_str(), "1" | "true" | "True"),
        }
    }
}

/// The `image_optimize` member: `false` or a parameter object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ImageOptimizeField {
    Disabled(bool),
    Enabled {
        width: u32,
        height: u32,
        quality: u8,
    },
}

impl ImageOptimizeField {
    pub(crate) fn into_option(self) -> Result<Option<ImageOptimize>, DecodeError> {
        match self {
            Self::Disabled(false) => Ok(None),
            Self::Disabled(true) => Err(DecodeError::Invalid(
                "Image optimization flag is invalid.".to_string(),
            )),
            Self::Enabled {
                width,
                height,
                quality,
            } => Ok(Some(ImageOptimize {
                width,
                height,
                quality,
            })),
        }
    }
}
