//! SQLite-backed document index.

use crate::embeddings::EmbeddingProvider;
use crate::filter::MetadataFilter;
use crate::types::Document;
use relay_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A store that answers similarity searches over documents.
#[async_trait::async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Top `top_k` documents for `query`, best first, restricted by an
    /// optional metadata filter expression.
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&str>,
    ) -> AppResult<Vec<(Document, f32)>>;

    /// Embed and store documents. Returns the number stored.
    async fn add_documents(&self, documents: Vec<Document>) -> AppResult<usize>;

    /// Number of stored documents.
    async fn count(&self) -> AppResult<usize>;
}

/// Document index persisted in a single SQLite file.
///
/// Embeddings are stored as little-endian `f32` blobs and scored in process
/// with cosine similarity.
#[derive(Debug, Clone)]
pub struct SqliteDocumentIndex {
    conn: Arc<Mutex<Connection>>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl SqliteDocumentIndex {
    /// Open (or create) the index file.
    pub fn open(path: &Path, embeddings: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Index(format!("Failed to open index {:?}: {}", path, e)))?;
        tracing::debug!("Opened document index at {:?}", path);
        Self::with_connection(conn, embeddings)
    }

    pub fn open_in_memory(embeddings: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Index(format!("Failed to open in-memory index: {}", e)))?;
        Self::with_connection(conn, embeddings)
    }

    fn with_connection(conn: Connection, embeddings: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                model TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embeddings,
        })
    }

    pub fn embeddings(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embeddings
    }

    /// Delete every document.
    pub async fn clear(&self) -> AppResult<()> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM documents", [])
                .map_err(|e| AppError::Index(format!("Failed to delete documents: {}", e)))?;
            Ok(())
        })
        .await?;
        tracing::info!("Cleared document index");
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AppError::Index("Index connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Index(format!("Index task failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl DocumentIndex for SqliteDocumentIndex {
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&str>,
    ) -> AppResult<Vec<(Document, f32)>> {
        let filter = MetadataFilter::parse(filter.unwrap_or_default())?;
        let query_embedding = self.embeddings.embed(query).await?;

        let mut results = self
            .blocking(move |conn| load_scored(conn, &query_embedding, &filter))
            .await?;

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        tracing::debug!(
            returned = results.len(),
            top_k,
            "Similarity search complete"
        );
        Ok(results)
    }

    async fn add_documents(&self, documents: Vec<Document>) -> AppResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embeddings.embed_batch(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(AppError::Index(format!(
                "Embedding provider returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let model = self.embeddings.model_name().to_string();
        let count = self
            .blocking(move |conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;

                for (doc, vector) in documents.iter().zip(vectors.iter()) {
                    let metadata = serde_json::to_string(&doc.metadata)?;
                    tx.execute(
                        "INSERT OR REPLACE INTO documents (id, content, metadata, embedding, model)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![doc.id, doc.page_content, metadata, embedding_to_bytes(vector), model],
                    )
                    .map_err(|e| AppError::Index(format!("Failed to insert document: {}", e)))?;
                }

                tx.commit()
                    .map_err(|e| AppError::Index(format!("Failed to commit documents: {}", e)))?;
                Ok(documents.len())
            })
            .await?;

        tracing::info!(count, "Added documents to index");
        Ok(count)
    }

    async fn count(&self) -> AppResult<usize> {
        self.blocking(|conn| {
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(|e| AppError::Index(format!("Failed to count documents: {}", e)))
        })
        .await
    }
}

fn load_scored(
    conn: &Connection,
    query_embedding: &[f32],
    filter: &MetadataFilter,
) -> AppResult<Vec<(Document, f32)>> {
    let mut stmt = conn
        .prepare("SELECT id, content, metadata, embedding FROM documents")
        .map_err(|e| AppError::Index(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })
        .map_err(|e| AppError::Index(format!("Failed to query documents: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let (id, content, metadata, blob) =
            row.map_err(|e| AppError::Index(format!("Failed to read document: {}", e)))?;

        let metadata: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&metadata)?;
        if !filter.matches(&metadata) {
            continue;
        }

        let score = cosine_similarity(query_embedding, &bytes_to_embedding(&blob)?);
        results.push((
            Document {
                id,
                page_content: content,
                metadata,
            },
            score,
        ));
    }

    Ok(results)
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index("Invalid embedding bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity; zero for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramEmbeddings;
    use crate::types::SOURCE_KEY;
    use tempfile::TempDir;

    fn trigram() -> Arc<dyn EmbeddingProvider> {
        Arc::new(TrigramEmbeddings::new(256))
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let embedding = vec![0.5, -1.25, 3.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);
        assert!(bytes_to_embedding(&bytes[..5]).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_open_creates_file_and_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("index.sqlite");

        {
            let index = SqliteDocumentIndex::open(&path, trigram()).unwrap();
            index
                .add_documents(vec![Document::new("persisted content")])
                .await
                .unwrap();
        }

        let reopened = SqliteDocumentIndex::open(&path, trigram()).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_similarity_search_ranks_and_truncates() {
        let index = SqliteDocumentIndex::open_in_memory(trigram()).unwrap();
        index
            .add_documents(vec![
                Document::new("Refunds are processed within five business days")
                    .with_metadata(SOURCE_KEY, "refunds.md"),
                Document::new("Shipping takes two weeks to international destinations")
                    .with_metadata(SOURCE_KEY, "shipping.md"),
                Document::new("Warranty covers manufacturing defects for one year")
                    .with_metadata(SOURCE_KEY, "warranty.md"),
            ])
            .await
            .unwrap();

        let results = index
            .similarity_search("how are refunds processed", 2, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.source().as_deref(), Some("refunds.md"));
        assert!(results[0].1 >= results[1].1);
    }

    #[tokio::test]
    async fn test_similarity_search_with_filter() {
        let index = SqliteDocumentIndex::open_in_memory(trigram()).unwrap();
        index
            .add_documents(vec![
                Document::new("tenant alpha invoice totals").with_metadata("tenant", "alpha"),
                Document::new("tenant beta invoice totals").with_metadata("tenant", "beta"),
            ])
            .await
            .unwrap();

        let results = index
            .similarity_search("invoice totals", 10, Some("tenant=beta"))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.metadata["tenant"], "beta");
    }

    #[tokio::test]
    async fn test_invalid_filter_is_error() {
        let index = SqliteDocumentIndex::open_in_memory(trigram()).unwrap();
        let result = index.similarity_search("anything", 3, Some("broken")).await;
        assert!(matches!(result, Err(AppError::Index(_))));
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = SqliteDocumentIndex::open_in_memory(trigram()).unwrap();
        let results = index.similarity_search("anything", 3, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let index = SqliteDocumentIndex::open_in_memory(trigram()).unwrap();
        index
            .add_documents(vec![Document::new("one"), Document::new("two")])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
