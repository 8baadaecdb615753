use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use chunkyard_protocol::{ChunkSubmission, SubmitResponse, UploadProgress};
use uuid::Uuid;

use crate::artifact::{Artifact, ArtifactStore, MemoryArtifactStore};
use crate::config::{RegistryConfig, SessionCreation};
use crate::session::UploadSession;
use crate::{AssemblyError, validate_submission};

/// Result of an accepted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The session still waits for `remaining` chunks.
    InProgress { received: u32, remaining: u32 },
    /// The chunk completed the upload; the artifact is stored.
    Completed { artifact_id: Uuid },
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::InProgress {
                received,
                remaining,
            } => SubmitResponse::InProgress {
                received_chunks: received,
                remaining_chunks: remaining,
            },
            SubmitOutcome::Completed { artifact_id } => SubmitResponse::Complete {
                artifact_id: artifact_id.hyphenated().to_string(),
            },
        }
    }
}

/// Registry entry for one upload id.
///
/// `session` becomes `None` once the upload is finalized or expired; a
/// submitter still holding the handle must look the id up again.
/// `in_flight` counts submissions that resolved this handle and have not
/// finished yet; it only changes under the registry map lock (increment)
/// or after the session lock is released (decrement).
struct SessionSlot {
    in_flight: AtomicUsize,
    session: Mutex<Option<UploadSession>>,
}

type SessionHandle = Arc<SessionSlot>;

/// Decrements the in-flight counter when a submission ends.
struct InFlight(SessionHandle);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Admits chunks, detects completion, finalizes artifacts and reclaims
/// abandoned sessions.
///
/// Safe to share between threads (`Arc<UploadRegistry>`). Work on
/// different upload ids only contends on the short map lookup; all
/// mutations of one session happen under that session's own mutex.
pub struct UploadRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    store: Arc<dyn ArtifactStore>,
    session_creation: SessionCreation,
    default_content_type: String,
}

impl UploadRegistry {
    /// Creates a registry that finalizes into `store`.
    pub fn new(config: &RegistryConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            session_creation: config.session_creation,
            default_content_type: config.default_content_type.clone(),
        }
    }

    /// Creates a registry backed by a fresh [`MemoryArtifactStore`].
    pub fn in_memory(config: &RegistryConfig) -> Self {
        Self::new(config, Arc::new(MemoryArtifactStore::new()))
    }

    /// The artifact store finalized uploads land in.
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Admits one chunk.
    ///
    /// Creates the session on first sight of an unknown id (subject to the
    /// configured [`SessionCreation`] policy), stores the payload at its
    /// index, and finalizes the upload when the last slot is filled.
    pub fn submit_chunk(&self, chunk: ChunkSubmission) -> Result<SubmitOutcome, AssemblyError> {
        validate_submission(&chunk)?;

        let ChunkSubmission {
            upload_id,
            file_name,
            file_type,
            chunk_index,
            total_chunks,
            bytes,
        } = chunk;

        loop {
            let guard = self.acquire(&upload_id, chunk_index, total_chunks, &file_name, &file_type)?;
            let handle = Arc::clone(&guard.0);
            let mut slot = lock(&handle.session);

            let Some(session) = slot.as_mut() else {
                // Finalized or expired between lookup and lock.
                tracing::debug!(upload_id = %upload_id, "session retired during lookup, retrying");
                continue;
            };

            if session.total_chunks() != total_chunks {
                tracing::warn!(
                    upload_id = %upload_id,
                    expected = session.total_chunks(),
                    got = total_chunks,
                    "conflicting chunk count"
                );
                return Err(AssemblyError::InconsistentUpload {
                    upload_id,
                    expected: session.total_chunks(),
                    got: total_chunks,
                });
            }

            let replaced = session.store(chunk_index, bytes, Instant::now())?;
            tracing::debug!(
                upload_id = %upload_id,
                chunk_index,
                replaced,
                received = session.received_count(),
                total = total_chunks,
                "chunk accepted"
            );

            if !session.is_complete() {
                return Ok(SubmitOutcome::InProgress {
                    received: session.received_count(),
                    remaining: session.remaining(),
                });
            }

            let artifact_id = self.finalize(session)?;

            // Retire under the session lock so no later submitter can
            // observe the completed session.
            *slot = None;
            self.detach(&upload_id, &handle);
            return Ok(SubmitOutcome::Completed { artifact_id });
        }
    }

    /// Stores a whole, non-chunked upload directly as an artifact.
    pub fn store_whole(
        &self,
        file_name: &str,
        file_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Uuid, AssemblyError> {
        if bytes.is_empty() {
            return Err(AssemblyError::InvalidChunk(format!(
                "empty payload for {file_name}"
            )));
        }

        let id = self.store.put(bytes, self.content_type(file_type), file_name)?;
        tracing::info!(artifact_id = %id, file_name, "whole upload stored");
        Ok(id)
    }

    /// Removes every session idle for longer than `max_idle` at `now`.
    ///
    /// Partial uploads are discarded, never finalized. Sessions with a
    /// submission in flight are skipped until the next sweep.
    pub fn expire_stale_sessions(&self, now: Instant, max_idle: Duration) -> Vec<String> {
        let mut sessions = lock(&self.sessions);
        let mut expired = Vec::new();

        sessions.retain(|upload_id, handle| {
            if handle.in_flight.load(Ordering::Acquire) > 0 {
                return true;
            }

            let mut slot = match handle.session.try_lock() {
                Ok(slot) => slot,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return true,
            };

            let Some(session) = slot.as_ref() else {
                return false;
            };
            if !session.is_idle(now, max_idle) {
                return true;
            }

            tracing::info!(
                upload_id = %upload_id,
                received = session.received_count(),
                total = session.total_chunks(),
                "session expired"
            );
            *slot = None;
            expired.push(upload_id.clone());
            false
        });

        expired
    }

    /// Returns the artifact stored under `artifact_id`.
    ///
    /// Ids that do not parse as a UUID are reported as `NotFound`.
    pub fn get_artifact(&self, artifact_id: &str) -> Result<Arc<Artifact>, AssemblyError> {
        let id = Uuid::parse_str(artifact_id)
            .map_err(|_| AssemblyError::NotFound(artifact_id.to_string()))?;
        self.store.get(&id)
    }

    /// Returns a progress snapshot of an active session.
    pub fn session_progress(&self, upload_id: &str) -> Result<UploadProgress, AssemblyError> {
        let handle = lock(&self.sessions)
            .get(upload_id)
            .cloned()
            .ok_or_else(|| AssemblyError::SessionNotFound(upload_id.to_string()))?;

        let slot = lock(&handle.session);
        slot.as_ref()
            .map(UploadSession::progress)
            .ok_or_else(|| AssemblyError::SessionNotFound(upload_id.to_string()))
    }

    /// Number of sessions currently awaiting chunks.
    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Finds or creates the slot for `upload_id` and marks it in flight.
    fn acquire(
        &self,
        upload_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        file_name: &str,
        file_type: &str,
    ) -> Result<InFlight, AssemblyError> {
        let mut sessions = lock(&self.sessions);

        let handle = match sessions.get(upload_id) {
            Some(handle) => Arc::clone(handle),
            None => {
                if self.session_creation == SessionCreation::FirstChunkOnly && chunk_index != 0 {
                    tracing::warn!(
                        upload_id,
                        chunk_index,
                        "chunk for unknown upload before chunk 0"
                    );
                    return Err(AssemblyError::SessionNotFound(upload_id.to_string()));
                }

                let session = UploadSession::new(
                    upload_id.to_string(),
                    file_name.to_string(),
                    file_type.to_string(),
                    total_chunks,
                    Instant::now(),
                );
                let handle = Arc::new(SessionSlot {
                    in_flight: AtomicUsize::new(0),
                    session: Mutex::new(Some(session)),
                });
                sessions.insert(upload_id.to_string(), Arc::clone(&handle));
                tracing::debug!(upload_id, total_chunks, file_name, "session created");
                handle
            }
        };

        handle.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(InFlight(handle))
    }

    /// Concatenates a complete session and registers the artifact.
    ///
    /// On failure the session is left as is so chunks can be resubmitted.
    fn finalize(&self, session: &UploadSession) -> Result<Uuid, AssemblyError> {
        let bytes = session.assemble().inspect_err(|e| {
            tracing::error!(upload_id = session.upload_id(), error = %e, "assembly failed");
        })?;
        let size = bytes.len();

        let artifact_id = self
            .store
            .put(bytes, self.content_type(session.file_type()), session.file_name())
            .inspect_err(|e| {
                tracing::error!(upload_id = session.upload_id(), error = %e, "artifact registration failed");
            })?;

        tracing::info!(
            upload_id = session.upload_id(),
            artifact_id = %artifact_id,
            chunks = session.total_chunks(),
            size,
            elapsed = ?session.created_at().elapsed(),
            "upload finalized"
        );
        Ok(artifact_id)
    }

    /// Removes `handle` from the map if it is still the entry for `upload_id`.
    fn detach(&self, upload_id: &str, handle: &SessionHandle) {
        let mut sessions = lock(&self.sessions);
        if sessions
            .get(upload_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            sessions.remove(upload_id);
        }
    }

    fn content_type<'a>(&'a self, declared: &'a str) -> &'a str {
        if declared.is_empty() {
            &self.default_content_type
        } else {
            declared
        }
    }
}
