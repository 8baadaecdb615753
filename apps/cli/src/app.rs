//! Upload driver: streams a file in chunks, submits them out of order and
//! verifies the result.

use std::sync::Arc;

use anyhow::{Context, bail};
use chunkyard_assembly::{
    AssemblyError, Chunk, ChunkReader, RegistryConfig, SessionSweeper, SubmitOutcome,
    UploadRegistry, calculate_file_checksum,
};
use chunkyard_protocol::{ArtifactInfo, ChunkSubmission, SubmitResponse};
use tokio::task::JoinSet;

use crate::Cli;

pub async fn run(cli: &Cli, config: RegistryConfig) -> anyhow::Result<ArtifactInfo> {
    let registry = Arc::new(UploadRegistry::in_memory(&config));
    let sweeper = SessionSweeper::new(Arc::clone(&registry), &config);
    sweeper.start();

    let file_name = cli
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let artifact_id = if cli.whole {
        let bytes = tokio::fs::read(&cli.file)
            .await
            .with_context(|| format!("failed to read {}", cli.file.display()))?;
        registry
            .store_whole(&file_name, &cli.content_type, bytes)?
            .hyphenated()
            .to_string()
    } else {
        upload_chunked(&registry, cli, &file_name, config.chunk_size).await?
    };

    sweeper.stop();

    let artifact = registry.get_artifact(&artifact_id)?;
    let expected = calculate_file_checksum(&cli.file)?;
    if artifact.sha256() != expected {
        bail!(
            "checksum mismatch for {artifact_id}: expected {expected}, got {}",
            artifact.sha256()
        );
    }
    tracing::info!(%artifact_id, size = artifact.size(), "artifact verified");
    Ok(artifact.info())
}

/// Chunks submitted but not yet acknowledged.
const MAX_IN_FLIGHT: usize = 8;

/// Streams chunks into the registry as they are read, holding chunk 0 back
/// so it is submitted last, and returns the artifact id reported by the
/// completing submission.
async fn upload_chunked(
    registry: &Arc<UploadRegistry>,
    cli: &Cli,
    file_name: &str,
    chunk_size: usize,
) -> anyhow::Result<String> {
    let mut reader = ChunkReader::new(&cli.file, chunk_size)?;
    let total_chunks = reader.total_chunks();
    if total_chunks == 0 {
        bail!("{} is empty", cli.file.display());
    }

    let upload_id = format!("{file_name}-{}", std::process::id());
    tracing::info!(
        %upload_id,
        total_chunks,
        size = reader.file_size(),
        "uploading in chunks"
    );

    let submission = |chunk: Chunk| ChunkSubmission {
        upload_id: upload_id.clone(),
        file_name: file_name.to_string(),
        file_type: cli.content_type.clone(),
        chunk_index: chunk.index,
        total_chunks,
        bytes: chunk.data,
    };

    let mut tasks = JoinSet::new();
    let mut artifact_id = None;
    let mut first = None;

    while let Some(chunk) = reader.next_chunk()? {
        if chunk.index == 0 {
            first = Some(chunk);
            continue;
        }
        if tasks.len() >= MAX_IN_FLIGHT {
            if let Some(joined) = tasks.join_next().await {
                record(joined, &mut artifact_id)?;
            }
        }
        let registry = Arc::clone(registry);
        let chunk = submission(chunk);
        tasks.spawn_blocking(move || registry.submit_chunk(chunk));
    }

    let first = first.context("chunk reader yielded no first chunk")?;
    let registry = Arc::clone(registry);
    let chunk = submission(first);
    tasks.spawn_blocking(move || registry.submit_chunk(chunk));

    while let Some(joined) = tasks.join_next().await {
        record(joined, &mut artifact_id)?;
    }

    artifact_id.with_context(|| format!("upload {upload_id} never completed"))
}

type Joined = Result<Result<SubmitOutcome, AssemblyError>, tokio::task::JoinError>;

fn record(joined: Joined, artifact_id: &mut Option<String>) -> anyhow::Result<()> {
    let outcome = joined.context("submission task panicked")??;
    tracing::debug!(response = ?SubmitResponse::from(outcome.clone()), "chunk accepted");
    if let SubmitOutcome::Completed { artifact_id: id } = outcome {
        *artifact_id = Some(id.hyphenated().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn cli_for(file: PathBuf, whole: bool) -> Cli {
        Cli {
            file,
            config: PathBuf::from("absent.toml"),
            chunk_size: None,
            content_type: String::new(),
            whole,
        }
    }

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn small_chunks() -> RegistryConfig {
        RegistryConfig {
            chunk_size: 3,
            ..RegistryConfig::default()
        }
    }

    #[tokio::test]
    async fn chunked_upload_reassembles_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"the quick brown fox jumps over the lazy dog";
        let path = write_file(dir.path(), "fox.txt", data);

        let info = run(&cli_for(path, false), small_chunks()).await.unwrap();
        assert_eq!(info.original_name, "fox.txt");
        assert_eq!(info.size, data.len() as u64);
        assert_eq!(info.content_type, "application/octet-stream");
        assert_eq!(info.sha256, chunkyard_assembly::checksum_bytes(data));
    }

    #[tokio::test]
    async fn many_chunks_stream_through_bounded_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let path = write_file(dir.path(), "ramp.bin", &data);
        let config = RegistryConfig {
            chunk_size: 7,
            ..RegistryConfig::default()
        };

        // 143 chunks, far more than MAX_IN_FLIGHT.
        let info = run(&cli_for(path, false), config).await.unwrap();
        assert_eq!(info.size, 1000);
        assert_eq!(info.sha256, chunkyard_assembly::checksum_bytes(&data));
    }

    #[tokio::test]
    async fn single_chunk_file_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "tiny.txt", b"ab");

        let info = run(&cli_for(path, false), small_chunks()).await.unwrap();
        assert_eq!(info.size, 2);
    }

    #[tokio::test]
    async fn whole_upload_stores_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "one.bin", b"single piece");

        let mut cli = cli_for(path, true);
        cli.content_type = "application/x-demo".into();
        let info = run(&cli, small_chunks()).await.unwrap();
        assert_eq!(info.size, 12);
        assert_eq!(info.content_type, "application/x-demo");
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.bin", b"");

        let err = run(&cli_for(path, false), small_chunks()).await.unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }
}
