//! Ranking and retrieval tests over a fixed-vector embedding provider.

use crate::embeddings::EmbeddingProvider;
use crate::index::{DocumentIndex, SqliteDocumentIndex};
use crate::retriever::DocumentRetriever;
use crate::types::{Document, SOURCE_KEY};
use relay_core::AppResult;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps known texts to hand-picked vectors; anything else embeds to zero.
#[derive(Debug)]
struct FixedEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbeddings {
    fn new(entries: &[(&str, [f32; 4])]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, v)| (text.to_string(), normalize(v)))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FixedEmbeddings {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| vec![0.0; 4]))
            .collect())
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

const RUST_DOC: &str = "Rust is a systems programming language";
const PASTA_DOC: &str = "Cooking recipes for pasta";
const CARGO_DOC: &str = "Cargo builds Rust crates";
const QUERY: &str = "rust programming";

async fn seeded_index() -> SqliteDocumentIndex {
    let embeddings = FixedEmbeddings::new(&[
        (RUST_DOC, [1.0, 0.5, 0.2, 0.1]),
        (PASTA_DOC, [-0.3, -0.8, 0.4, -0.2]),
        (CARGO_DOC, [0.7, 0.6, 0.0, 0.3]),
        (QUERY, [0.9, 0.4, 0.3, 0.1]),
    ]);

    let index = SqliteDocumentIndex::open_in_memory(Arc::new(embeddings)).unwrap();
    index
        .add_documents(vec![
            Document::new(RUST_DOC)
                .with_metadata(SOURCE_KEY, "rust.md")
                .with_metadata("team", "lang"),
            Document::new(PASTA_DOC)
                .with_metadata(SOURCE_KEY, "kitchen.md")
                .with_metadata("team", "food"),
            Document::new(CARGO_DOC)
                .with_metadata(SOURCE_KEY, "rust.md")
                .with_metadata("team", "tools"),
        ])
        .await
        .unwrap();
    index
}

#[tokio::test]
async fn test_relevant_document_ranks_first() {
    let index = seeded_index().await;
    let results = index.similarity_search(QUERY, 3, None).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0.page_content, RUST_DOC);
    assert_eq!(results[2].0.page_content, PASTA_DOC);
    assert!(results[0].1 > 0.9);
    assert!(results[2].1 < 0.0);
}

#[tokio::test]
async fn test_scores_are_descending() {
    let index = seeded_index().await;
    let results = index.similarity_search(QUERY, 10, None).await.unwrap();

    for pair in results.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

#[tokio::test]
async fn test_retriever_shapes_context() {
    let index = seeded_index().await;
    let retriever = DocumentRetriever::new(Arc::new(index), 2);

    let context = retriever.retrieve(QUERY, &[]).await.unwrap();
    assert_eq!(context.relevant_docs, format!("{}\n{}", RUST_DOC, CARGO_DOC));
    assert_eq!(context.references, vec!["rust.md".to_string()]);
}

#[tokio::test]
async fn test_retriever_interpolates_filter() {
    let index = seeded_index().await;
    let retriever = DocumentRetriever::new(Arc::new(index), 5)
        .with_filter(Some("team=(userSessionId)".to_string()));

    let context = retriever
        .retrieve(QUERY, &[("question", QUERY), ("userSessionId", "food")])
        .await
        .unwrap();

    assert_eq!(context.relevant_docs, PASTA_DOC);
    assert_eq!(context.references, vec!["kitchen.md".to_string()]);
}

#[tokio::test]
async fn test_blank_filter_is_ignored() {
    let index = seeded_index().await;
    let retriever = DocumentRetriever::new(Arc::new(index), 5).with_filter(Some("  ".to_string()));

    let context = retriever.retrieve(QUERY, &[]).await.unwrap();
    assert_eq!(context.relevant_docs.lines().count(), 3);
}
