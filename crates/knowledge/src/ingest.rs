//! File ingestion into a document index.

use crate::chunker::documents_from_text;
use crate::index::DocumentIndex;
use relay_core::{AppError, AppResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub files: usize,
    pub documents: usize,
    pub bytes: u64,
    pub duration_secs: f64,
}

/// Chunk, embed and store each file.
///
/// Files are processed in order; the first unreadable file aborts the run
/// with the documents of earlier files already stored.
pub async fn ingest_files(
    index: &dyn DocumentIndex,
    paths: &[PathBuf],
    chunk_size: usize,
) -> AppResult<IngestStats> {
    let start = Instant::now();
    let mut stats = IngestStats::default();

    for path in paths {
        let (documents, bytes) = ingest_file(index, path, chunk_size).await?;
        stats.files += 1;
        stats.documents += documents;
        stats.bytes += bytes;
    }

    stats.duration_secs = start.elapsed().as_secs_f64();
    tracing::info!(
        "Ingested {} files, {} documents, {} bytes in {:.2}s",
        stats.files,
        stats.documents,
        stats.bytes,
        stats.duration_secs
    );
    Ok(stats)
}

async fn ingest_file(
    index: &dyn DocumentIndex,
    path: &Path,
    chunk_size: usize,
) -> AppResult<(usize, u64)> {
    if !path.is_file() {
        return Err(AppError::Index(format!("Not a file: {}", path.display())));
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Index(format!("Failed to read {}: {}", path.display(), e)))?;

    let source = path.to_string_lossy().to_string();
    let documents = documents_from_text(&source, &text, chunk_size);
    let stored = index.add_documents(documents).await?;

    tracing::debug!("Processed {:?}: {} documents", path, stored);
    Ok((stored, text.len() as u64))
}
