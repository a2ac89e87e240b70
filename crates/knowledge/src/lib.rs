//! Document index source for Relay.
//!
//! Local-first retrieval over a SQLite file: documents are embedded on
//! ingestion, ranked by cosine similarity at question time and narrowed by
//! metadata filters interpolated from the turn input.

pub mod chunker;
pub mod embeddings;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod retriever;
pub mod types;

#[cfg(test)]
mod tests;

pub use embeddings::{create_provider, EmbeddingProvider, OllamaEmbeddings, TrigramEmbeddings};
pub use filter::{interpolate_filter, MetadataFilter};
pub use index::{DocumentIndex, SqliteDocumentIndex};
pub use ingest::{ingest_files, IngestStats};
pub use retriever::DocumentRetriever;
pub use types::{Document, RetrievedContext};

use relay_core::sources::IndexSourceConfig;
use relay_core::AppResult;

/// Open the index described by configuration, with its embedding provider.
pub fn open_index(config: &IndexSourceConfig) -> AppResult<SqliteDocumentIndex> {
    let embeddings = create_provider(&config.embedding)?;
    SqliteDocumentIndex::open(&config.path, embeddings)
}
