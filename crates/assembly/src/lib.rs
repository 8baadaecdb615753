//! Chunked upload assembly with out-of-order admission, exactly-once
//! finalization and idle session expiry.
//!
//! The transport layer hands [`UploadRegistry`] validated chunk
//! submissions; once every chunk of an upload has arrived the registry
//! concatenates them in index order and registers the result in an
//! [`ArtifactStore`].

mod artifact;
mod chunked;
mod config;
mod registry;
mod session;
mod sweeper;
mod validation;

pub use artifact::{Artifact, ArtifactStore, MemoryArtifactStore};
pub use chunked::{Chunk, ChunkReader, calculate_file_checksum, checksum_bytes};
pub use config::{RegistryConfig, SessionCreation};
pub use registry::{SubmitOutcome, UploadRegistry};
pub use session::{MAX_REPORTED_MISSING, UploadSession};
pub use sweeper::{SessionSweeper, SweepReport};
pub use validation::validate_submission;

use chunkyard_protocol::{ErrorKind, ErrorResponse};

/// Default client-side chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by the assembly crate.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("inconsistent upload {upload_id}: session expects {expected} chunks, chunk declares {got}")]
    InconsistentUpload {
        upload_id: String,
        expected: u32,
        got: u32,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("concatenation failed for {upload_id}: accounted {expected} bytes, assembled {actual}")]
    InternalConcatenationFailure {
        upload_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl AssemblyError {
    /// Boundary error kind, or `None` for local failures (I/O, config)
    /// that never cross the submission boundary.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::InvalidChunk(_) => Some(ErrorKind::InvalidChunk),
            Self::InconsistentUpload { .. } => Some(ErrorKind::InconsistentUpload),
            Self::SessionNotFound(_) => Some(ErrorKind::SessionNotFound),
            Self::NotFound(_) => Some(ErrorKind::NotFound),
            Self::InternalConcatenationFailure { .. } => {
                Some(ErrorKind::InternalConcatenationFailure)
            }
            Self::Io(_) | Self::Config(_) => None,
        }
    }

    /// Renders the error for the transport layer.
    pub fn to_response(&self) -> Option<ErrorResponse> {
        self.kind()
            .map(|kind| ErrorResponse::new(kind, self.to_string()))
    }
}
