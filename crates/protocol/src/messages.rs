use serde::{Deserialize, Serialize};

use crate::types::ErrorKind;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// One chunk of a logical upload, as handed over by the transport layer.
///
/// The `bytes` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSubmission {
    pub upload_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Successful outcome of a chunk submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SubmitResponse {
    /// The session still waits for `remaining_chunks` more chunks.
    #[serde(rename = "in-progress", rename_all = "camelCase")]
    InProgress {
        received_chunks: u32,
        remaining_chunks: u32,
    },
    /// The last chunk arrived and the artifact was stored.
    #[serde(rename = "complete", rename_all = "camelCase")]
    Complete { artifact_id: String },
}

impl SubmitResponse {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Failed outcome of a submission or retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Binary payloads travel as standard base64 strings in JSON.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
