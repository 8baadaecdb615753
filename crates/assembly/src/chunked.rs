use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{AssemblyError, DEFAULT_CHUNK_SIZE};

/// One fixed-size piece of a file, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk position.
    pub index: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, AssemblyError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Splits a file into fixed-size chunks for submission.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    next_index: u32,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (4 MiB) is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, AssemblyError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };

        let reader = Self {
            file,
            chunk_size,
            next_index: 0,
            offset: 0,
            file_size,
        };
        if u32::try_from(reader.total_chunks_u64()).is_err() {
            return Err(AssemblyError::InvalidChunk(format!(
                "{} bytes need more than {} chunks of {chunk_size} bytes",
                file_size,
                u32::MAX
            )));
        }
        Ok(reader)
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, AssemblyError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = Chunk {
            index: self.next_index,
            offset: self.offset,
            data: buf,
        };
        self.next_index += 1;
        self.offset += read_size as u64;
        Ok(Some(chunk))
    }

    /// Reads every remaining chunk.
    pub fn read_all(mut self) -> Result<Vec<Chunk>, AssemblyError> {
        let mut chunks = Vec::with_capacity(self.total_chunks() as usize);
        while let Some(chunk) = self.next_chunk()? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Number of chunks the whole file splits into (0 for an empty file).
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks_u64() as u32
    }

    fn total_chunks_u64(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size as u64)
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}
