use crate::stage::{SourceKind, Stage, StageContext};
use relay_core::sources::IndexSourceConfig;
use relay_core::AppResult;
use relay_knowledge::{open_index, DocumentIndex, DocumentRetriever};
use relay_sources::StageInput;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Similarity search over the document index.
pub struct DocumentsStage {
    config: IndexSourceConfig,
    index: OnceCell<Arc<dyn DocumentIndex>>,
}

impl DocumentsStage {
    pub fn new(config: IndexSourceConfig, index: Option<Arc<dyn DocumentIndex>>) -> Self {
        Self {
            config,
            index: OnceCell::new_with(index),
        }
    }

    async fn index(&self) -> AppResult<Arc<dyn DocumentIndex>> {
        self.index
            .get_or_try_init(|| async {
                let index = open_index(&self.config)?;
                Ok::<_, relay_core::AppError>(Arc::new(index) as Arc<dyn DocumentIndex>)
            })
            .await
            .cloned()
    }
}

#[async_trait::async_trait]
impl Stage for DocumentsStage {
    fn kind(&self) -> SourceKind {
        SourceKind::Documents
    }

    async fn initialize(&self) -> AppResult<()> {
        self.index().await.map(|_| ())
    }

    async fn run(&self, input: &StageInput) -> AppResult<StageContext> {
        let retriever = DocumentRetriever::new(self.index().await?, self.config.top_k)
            .with_filter(self.config.filter.clone());
        let found = retriever.retrieve(&input.question, &input.filter_vars()).await?;

        tracing::debug!(references = found.references.len(), "Retrieved documents");
        Ok(StageContext::documents(found.relevant_docs, &found.references))
    }
}
