use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chunkyard_protocol::ArtifactInfo;
use uuid::Uuid;

use crate::AssemblyError;
use crate::chunked::checksum_bytes;

/// A finalized, immutable upload.
#[derive(Debug)]
pub struct Artifact {
    id: Uuid,
    bytes: Vec<u8>,
    content_type: String,
    original_name: String,
    sha256: String,
    stored_at: Instant,
}

impl Artifact {
    fn new(id: Uuid, bytes: Vec<u8>, content_type: &str, original_name: &str) -> Self {
        let sha256 = checksum_bytes(&bytes);
        Self {
            id,
            bytes,
            content_type: content_type.to_string(),
            original_name: original_name.to_string(),
            sha256,
            stored_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Hex-encoded SHA-256 of the bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    /// Returns retrieval metadata for the transport layer.
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            artifact_id: self.id.hyphenated().to_string(),
            content_type: self.content_type.clone(),
            original_name: self.original_name.clone(),
            size: self.size(),
            sha256: self.sha256.clone(),
        }
    }
}

/// Holds finalized artifacts keyed by a generated id.
///
/// Implementations must never hand out the same id twice within the
/// process lifetime and must treat stored artifacts as immutable.
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` and returns a fresh artifact id.
    fn put(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        original_name: &str,
    ) -> Result<Uuid, AssemblyError>;

    /// Returns the artifact stored under `id`.
    fn get(&self, id: &Uuid) -> Result<Arc<Artifact>, AssemblyError>;

    /// Evicts an artifact, returning it if it was present.
    fn remove(&self, id: &Uuid) -> Option<Arc<Artifact>>;

    /// Evicts every artifact stored more than `max_age` before `now`.
    fn evict_older_than(&self, now: Instant, max_age: Duration) -> Vec<Uuid>;

    /// Number of stored artifacts.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    inner: RwLock<HashMap<Uuid, Arc<Artifact>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        original_name: &str,
    ) -> Result<Uuid, AssemblyError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let mut id = Uuid::new_v4();
        while inner.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let artifact = Artifact::new(id, bytes, content_type, original_name);
        tracing::debug!(
            artifact_id = %id,
            size = artifact.size(),
            content_type,
            "artifact stored"
        );
        inner.insert(id, Arc::new(artifact));
        Ok(id)
    }

    fn get(&self, id: &Uuid) -> Result<Arc<Artifact>, AssemblyError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .get(id)
            .cloned()
            .ok_or_else(|| AssemblyError::NotFound(id.hyphenated().to_string()))
    }

    fn remove(&self, id: &Uuid) -> Option<Arc<Artifact>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(id)
    }

    fn evict_older_than(&self, now: Instant, max_age: Duration) -> Vec<Uuid> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = Vec::new();
        inner.retain(|id, artifact| {
            let keep = now.saturating_duration_since(artifact.stored_at) <= max_age;
            if !keep {
                evicted.push(*id);
            }
            keep
        });
        evicted
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
