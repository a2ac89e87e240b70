//! Per-turn retrieval from a configured index.

use crate::filter::interpolate_filter;
use crate::index::DocumentIndex;
use crate::types::RetrievedContext;
use relay_core::AppResult;
use std::sync::Arc;

/// Runs the similarity search for one turn, with the configured filter
/// interpolated from the turn's variables.
#[derive(Clone)]
pub struct DocumentRetriever {
    index: Arc<dyn DocumentIndex>,
    top_k: usize,
    filter: Option<String>,
}

impl DocumentRetriever {
    pub fn new(index: Arc<dyn DocumentIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k,
            filter: None,
        }
    }

    /// Filter template, may contain `(key)` placeholders.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    pub async fn retrieve(
        &self,
        question: &str,
        vars: &[(&str, &str)],
    ) -> AppResult<RetrievedContext> {
        let filter = self
            .filter
            .as_deref()
            .map(|template| interpolate_filter(template, vars));

        tracing::debug!(top_k = self.top_k, filter = ?filter, "Retrieving documents");

        let results = self
            .index
            .similarity_search(question, self.top_k, filter.as_deref())
            .await?;
        Ok(RetrievedContext::from_ranked(&results))
    }
}

impl std::fmt::Debug for DocumentRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRetriever")
            .field("top_k", &self.top_k)
            .field("filter", &self.filter)
            .finish()
    }
}
