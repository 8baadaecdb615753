//! Boundary types exchanged between the transport layer and the
//! chunk assembly core.
//!
//! The transport decodes requests into [`ChunkSubmission`]s and renders
//! [`SubmitResponse`], [`ErrorResponse`] and [`ArtifactInfo`] back to
//! clients. No transport framing is defined here.

pub mod messages;
pub mod types;

pub use messages::{ChunkSubmission, ErrorResponse, SubmitResponse};
pub use types::{ArtifactInfo, ErrorKind, UploadProgress};

/// Content type used when a submitter does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
