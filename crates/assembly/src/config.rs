//! Registry configuration.
//!
//! Stored as TOML; every field has a default so a partial (or missing)
//! file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AssemblyError, DEFAULT_CHUNK_SIZE};

/// When an unknown upload id may open a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCreation {
    /// The first chunk seen for an unknown id opens the session, whatever its index.
    #[default]
    AnyChunk,
    /// Only chunk 0 opens a session; other indices fail with `SessionNotFound`.
    FirstChunkOnly,
}

/// Upload registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Sessions without an accepted chunk for this long are discarded.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// Interval between background expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Artifact retention in seconds (0 = keep until removed explicitly).
    #[serde(default)]
    pub artifact_ttl_secs: u64,

    #[serde(default)]
    pub session_creation: SessionCreation,

    /// Content type recorded when a submission declares none.
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Chunk size used by the client-side splitter.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_session_idle_timeout_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_content_type() -> String {
    chunkyard_protocol::DEFAULT_CONTENT_TYPE.into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            artifact_ttl_secs: 0,
            session_creation: SessionCreation::default(),
            default_content_type: default_content_type(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl RegistryConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, AssemblyError> {
        toml::from_str(content).map_err(|e| AssemblyError::Config(e.to_string()))
    }

    /// Loads configuration from `path`, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, AssemblyError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Sweep interval, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Artifact retention, or `None` when artifacts are kept indefinitely.
    pub fn artifact_ttl(&self) -> Option<Duration> {
        (self.artifact_ttl_secs > 0).then(|| Duration::from_secs(self.artifact_ttl_secs))
    }
}
