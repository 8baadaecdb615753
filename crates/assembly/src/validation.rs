use chunkyard_protocol::ChunkSubmission;

use crate::AssemblyError;

/// Checks the shape of a submission before any session state is touched.
///
/// Rejects:
/// - Empty upload ids
/// - `total_chunks == 0`
/// - `chunk_index` outside `[0, total_chunks)`
/// - Empty payloads
pub fn validate_submission(chunk: &ChunkSubmission) -> Result<(), AssemblyError> {
    if chunk.upload_id.is_empty() {
        return Err(AssemblyError::InvalidChunk("empty upload id".into()));
    }

    if chunk.total_chunks == 0 {
        return Err(AssemblyError::InvalidChunk(format!(
            "total chunks must be at least 1 for upload {}",
            chunk.upload_id
        )));
    }

    if chunk.chunk_index >= chunk.total_chunks {
        return Err(AssemblyError::InvalidChunk(format!(
            "chunk index {} out of range for {} chunks in upload {}",
            chunk.chunk_index, chunk.total_chunks, chunk.upload_id
        )));
    }

    if chunk.bytes.is_empty() {
        return Err(AssemblyError::InvalidChunk(format!(
            "empty payload for chunk {} of upload {}",
            chunk.chunk_index, chunk.upload_id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u32, total: u32, bytes: &[u8]) -> ChunkSubmission {
        ChunkSubmission {
            upload_id: "u1".into(),
            file_name: "f.bin".into(),
            file_type: String::new(),
            chunk_index: index,
            total_chunks: total,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn accepts_first_and_last_index() {
        assert!(validate_submission(&chunk(0, 3, b"a")).is_ok());
        assert!(validate_submission(&chunk(2, 3, b"c")).is_ok());
    }

    #[test]
    fn accepts_single_chunk_upload() {
        assert!(validate_submission(&chunk(0, 1, b"whole")).is_ok());
    }

    #[test]
    fn rejects_zero_total() {
        let err = validate_submission(&chunk(0, 0, b"a")).unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidChunk(_)));
    }

    #[test]
    fn rejects_index_equal_to_total() {
        assert!(matches!(
            validate_submission(&chunk(3, 3, b"a")),
            Err(AssemblyError::InvalidChunk(_))
        ));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            validate_submission(&chunk(0, 2, b"")),
            Err(AssemblyError::InvalidChunk(_))
        ));
    }

    #[test]
    fn rejects_empty_upload_id() {
        let mut c = chunk(0, 1, b"a");
        c.upload_id.clear();
        assert!(matches!(
            validate_submission(&c),
            Err(AssemblyError::InvalidChunk(_))
        ));
    }
}
