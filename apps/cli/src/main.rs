//! Chunkyard demo client entry point.

mod app;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Split a file into chunks and assemble it through an upload registry")]
pub struct Cli {
    /// File to upload.
    pub file: PathBuf,

    /// TOML registry configuration (defaults apply if absent).
    #[arg(long, default_value = "chunkyard.toml")]
    pub config: PathBuf,

    /// Chunk size in bytes, overriding the configured value.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Content type recorded with the artifact.
    #[arg(long, default_value = "")]
    pub content_type: String,

    /// Store the file in one piece instead of chunking it.
    #[arg(long)]
    pub whole: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunkyard");

    let mut config = chunkyard_assembly::RegistryConfig::load(&cli.config)?;
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    tracing::info!(path = %cli.config.display(), chunk_size = config.chunk_size, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    let info = rt.block_on(app::run(&cli, config))?;

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
