//! Index command handler.
//!
//! Manages the document index configured under `sources.index`.

use super::print_json;
use clap::{Args, Subcommand};
use relay_core::{config::AppConfig, AppError, AppResult};
use relay_knowledge::chunker::DEFAULT_CHUNK_SIZE;
use relay_knowledge::{ingest_files, open_index, DocumentIndex, SqliteDocumentIndex};
use std::path::PathBuf;

/// Document index management
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Chunk, embed and store text files
    Add(IndexAddCommand),
    /// Show the number of stored documents
    Stats(IndexStatsCommand),
    /// Delete every stored document
    Clear,
}

/// Ingest files
#[derive(Args, Debug)]
pub struct IndexAddCommand {
    /// Files to ingest
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Index statistics
#[derive(Args, Debug)]
pub struct IndexStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let index = open_configured_index(config)?;

        match self.action {
            IndexAction::Add(ref cmd) => {
                tracing::info!("Executing index add command");
                let stats = ingest_files(&index, &cmd.files, cmd.chunk_size).await?;
                if cmd.json {
                    let value = serde_json::to_value(&stats)
                        .map_err(|e| AppError::Serialization(e.to_string()))?;
                    print_json(&value)?;
                } else {
                    println!(
                        "Indexed {} files ({} documents, {} bytes) in {:.2}s",
                        stats.files, stats.documents, stats.bytes, stats.duration_secs
                    );
                }
            }
            IndexAction::Stats(ref cmd) => {
                let count = index.count().await?;
                if cmd.json {
                    print_json(&serde_json::json!({ "documents": count }))?;
                } else {
                    println!("Documents: {}", count);
                }
            }
            IndexAction::Clear => {
                tracing::info!("Executing index clear command");
                index.clear().await?;
                println!("Document index cleared");
            }
        }

        Ok(())
    }
}

fn open_configured_index(config: &AppConfig) -> AppResult<SqliteDocumentIndex> {
    let index_config = config.sources.index.as_ref().ok_or_else(|| {
        AppError::Config("No document index configured (sources.index)".to_string())
    })?;
    open_index(index_config)
}
