use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Failure category reported to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or missing fields. Not retryable as-is.
    InvalidChunk,
    /// Conflicting `totalChunks` for the same upload id.
    InconsistentUpload,
    /// The upload id is unknown, already finalized or expired.
    SessionNotFound,
    /// Artifact lookup miss.
    NotFound,
    /// Assembly produced an inconsistent buffer; the session stays active.
    InternalConcatenationFailure,
}

impl ErrorKind {
    /// HTTP-style status the boundary should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidChunk => 400,
            Self::InconsistentUpload => 409,
            Self::SessionNotFound | Self::NotFound => 404,
            Self::InternalConcatenationFailure => 500,
        }
    }

    /// Returns `true` for errors the client caused (4xx).
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidChunk => "InvalidChunk",
            Self::InconsistentUpload => "InconsistentUpload",
            Self::SessionNotFound => "SessionNotFound",
            Self::NotFound => "NotFound",
            Self::InternalConcatenationFailure => "InternalConcatenationFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown error kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InvalidChunk" => Ok(Self::InvalidChunk),
            "InconsistentUpload" => Ok(Self::InconsistentUpload),
            "SessionNotFound" => Ok(Self::SessionNotFound),
            "NotFound" => Ok(Self::NotFound),
            "InternalConcatenationFailure" => Ok(Self::InternalConcatenationFailure),
            other => Err(UnknownErrorKind(other.to_string())),
        }
    }
}

/// Retrieval metadata for a finalized artifact.
///
/// The transport uses it to set `Content-Type`, `Content-Length` and
/// `Content-Disposition` before streaming the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub artifact_id: String,
    pub content_type: String,
    pub original_name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
}

impl ArtifactInfo {
    /// Value for a `Content-Disposition` header offering the artifact as a download.
    ///
    /// Quotes and backslashes in the original name are escaped.
    pub fn content_disposition(&self) -> String {
        let name = if self.original_name.is_empty() {
            self.artifact_id.as_str()
        } else {
            self.original_name.as_str()
        };
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{escaped}\"")
    }
}

/// Snapshot of an in-progress upload, used by resuming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub upload_id: String,
    pub file_name: String,
    pub file_type: String,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub remaining_chunks: u32,
    pub received_bytes: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_chunks: Vec<u32>,
}

impl UploadProgress {
    /// Returns the upload progress as a percentage (0-100) of chunks received.
    pub fn percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        f64::from(self.received_chunks) / f64::from(self.total_chunks) * 100.0
    }
}
