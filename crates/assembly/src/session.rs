use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chunkyard_protocol::UploadProgress;

use crate::AssemblyError;

/// Upper bound on the indices listed by [`UploadSession::missing_chunks`].
pub const MAX_REPORTED_MISSING: usize = 1024;

/// Assembly state for one logical upload.
///
/// Not synchronized on its own: the registry keeps each session behind a
/// dedicated mutex. Only received chunks are stored, keyed by index, so
/// the declared `total_chunks` costs nothing until payloads arrive.
#[derive(Debug)]
pub struct UploadSession {
    upload_id: String,
    file_name: String,
    file_type: String,
    total_chunks: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
    /// Sum of the lengths of all stored chunks.
    received_bytes: u64,
    created_at: Instant,
    last_activity: Instant,
}

impl UploadSession {
    /// Creates an empty session expecting `total_chunks` chunks.
    pub fn new(
        upload_id: String,
        file_name: String,
        file_type: String,
        total_chunks: u32,
        now: Instant,
    ) -> Self {
        Self {
            upload_id,
            file_name,
            file_type,
            total_chunks,
            chunks: BTreeMap::new(),
            received_bytes: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Stores `bytes` at `index` and touches the activity marker.
    ///
    /// An already filled slot is overwritten without counting twice.
    /// Returns `true` when a previous payload was replaced.
    pub fn store(&mut self, index: u32, bytes: Vec<u8>, now: Instant) -> Result<bool, AssemblyError> {
        if index >= self.total_chunks {
            return Err(AssemblyError::InvalidChunk(format!(
                "chunk index {index} out of range for {} chunks in upload {}",
                self.total_chunks, self.upload_id
            )));
        }

        self.received_bytes += bytes.len() as u64;
        let replaced = match self.chunks.insert(index, bytes) {
            Some(previous) => {
                self.received_bytes -= previous.len() as u64;
                true
            }
            None => false,
        };
        self.last_activity = now;
        Ok(replaced)
    }

    /// Concatenates every chunk in index order.
    ///
    /// Fails without modifying the session if a chunk is missing or the
    /// assembled length disagrees with the accounted byte count.
    pub fn assemble(&self) -> Result<Vec<u8>, AssemblyError> {
        let failure = |actual: usize| AssemblyError::InternalConcatenationFailure {
            upload_id: self.upload_id.clone(),
            expected: self.received_bytes,
            actual: actual as u64,
        };

        if !self.is_complete() {
            return Err(failure(0));
        }

        let mut out = Vec::with_capacity(self.received_bytes as usize);
        for index in 0..self.total_chunks {
            let bytes = self.chunks.get(&index).ok_or_else(|| failure(out.len()))?;
            out.extend_from_slice(bytes);
        }

        if out.len() as u64 != self.received_bytes {
            return Err(failure(out.len()));
        }
        Ok(out)
    }

    /// Returns `true` once every chunk is stored.
    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }

    /// Returns `true` if no chunk was accepted during the last `max_idle`.
    pub fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > max_idle
    }

    /// Lowest indices still waiting for data, at most [`MAX_REPORTED_MISSING`].
    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|index| !self.chunks.contains_key(index))
            .take(MAX_REPORTED_MISSING)
            .collect()
    }

    /// Returns a protocol-compatible progress snapshot.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            upload_id: self.upload_id.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            total_chunks: self.total_chunks,
            received_chunks: self.received_count(),
            remaining_chunks: self.remaining(),
            received_bytes: self.received_bytes,
            missing_chunks: self.missing_chunks(),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Number of stored chunks.
    pub fn received_count(&self) -> u32 {
        // Keys are distinct indices below `total_chunks`.
        self.chunks.len() as u32
    }

    pub fn remaining(&self) -> u32 {
        self.total_chunks - self.received_count()
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: u32) -> UploadSession {
        UploadSession::new(
            "s1".into(),
            "report.pdf".into(),
            "application/pdf".into(),
            total,
            Instant::now(),
        )
    }

    #[test]
    fn new_session_is_empty() {
        let s = session(3);
        assert_eq!(s.total_chunks(), 3);
        assert_eq!(s.received_count(), 0);
        assert_eq!(s.remaining(), 3);
        assert!(!s.is_complete());
        assert_eq!(s.missing_chunks(), vec![0, 1, 2]);
    }

    #[test]
    fn store_out_of_order_then_assemble() {
        let mut s = session(3);
        let now = Instant::now();
        s.store(2, b"C".to_vec(), now).unwrap();
        s.store(0, b"A".to_vec(), now).unwrap();
        assert!(!s.is_complete());
        assert_eq!(s.missing_chunks(), vec![1]);

        s.store(1, b"B".to_vec(), now).unwrap();
        assert!(s.is_complete());
        assert_eq!(s.assemble().unwrap(), b"ABC");
    }

    #[test]
    fn overwrite_does_not_double_count() {
        let mut s = session(2);
        let now = Instant::now();
        assert!(!s.store(0, b"old".to_vec(), now).unwrap());
        assert!(s.store(0, b"newer".to_vec(), now).unwrap());
        assert_eq!(s.received_count(), 1);
        assert_eq!(s.received_bytes(), 5);

        s.store(1, b"!".to_vec(), now).unwrap();
        assert_eq!(s.received_count(), 2);
        assert_eq!(s.assemble().unwrap(), b"newer!");
    }

    #[test]
    fn store_out_of_range_leaves_session_untouched() {
        let mut s = session(2);
        let err = s.store(2, b"x".to_vec(), Instant::now()).unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidChunk(_)));
        assert_eq!(s.received_count(), 0);
        assert_eq!(s.received_bytes(), 0);
    }

    #[test]
    fn assemble_incomplete_fails() {
        let mut s = session(2);
        s.store(1, b"tail".to_vec(), Instant::now()).unwrap();
        let err = s.assemble().unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::InternalConcatenationFailure { .. }
        ));
        // Still holds the accepted chunk.
        assert_eq!(s.received_count(), 1);
    }

    #[test]
    fn store_touches_activity() {
        let start = Instant::now();
        let mut s = UploadSession::new("s1".into(), "f".into(), String::new(), 2, start);
        let later = start + Duration::from_secs(30);
        s.store(0, b"a".to_vec(), later).unwrap();
        assert_eq!(s.created_at(), start);
        assert_eq!(s.last_activity(), later);
    }

    #[test]
    fn idle_uses_last_activity() {
        let start = Instant::now();
        let mut s = UploadSession::new("s1".into(), "f".into(), String::new(), 2, start);
        let max_idle = Duration::from_secs(60);

        assert!(!s.is_idle(start + Duration::from_secs(60), max_idle));
        assert!(s.is_idle(start + Duration::from_secs(61), max_idle));

        s.store(0, b"a".to_vec(), start + Duration::from_secs(50)).unwrap();
        assert!(!s.is_idle(start + Duration::from_secs(61), max_idle));
    }

    #[test]
    fn progress_reports_missing_chunks() {
        let mut s = session(4);
        s.store(1, b"xx".to_vec(), Instant::now()).unwrap();
        let p = s.progress();
        assert_eq!(p.upload_id, "s1");
        assert_eq!(p.file_name, "report.pdf");
        assert_eq!(p.received_chunks, 1);
        assert_eq!(p.remaining_chunks, 3);
        assert_eq!(p.received_bytes, 2);
        assert_eq!(p.missing_chunks, vec![0, 2, 3]);
    }

    #[test]
    fn max_declared_count_stores_sparsely() {
        let mut s = session(u32::MAX);
        s.store(u32::MAX - 1, b"z".to_vec(), Instant::now()).unwrap();
        assert_eq!(s.received_count(), 1);
        assert_eq!(s.remaining(), u32::MAX - 1);
        assert!(!s.is_complete());

        let missing = s.missing_chunks();
        assert_eq!(missing.len(), MAX_REPORTED_MISSING);
        assert_eq!(missing[0], 0);
        assert!(matches!(
            s.assemble(),
            Err(AssemblyError::InternalConcatenationFailure { .. })
        ));
    }
}
