use super::StageDeps;
use crate::stage::{SourceKind, Stage, StageContext};
use relay_core::sources::DatabaseSourceConfig;
use relay_core::{AppError, AppResult};
use relay_sources::{SqlDatabase, SqlGuard, SqliteDatabase, StageInput};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Guarded SQL generation and execution.
pub struct SqlStage {
    config: DatabaseSourceConfig,
    deps: StageDeps,
    guard: OnceCell<SqlGuard>,
}

impl SqlStage {
    pub fn new(config: DatabaseSourceConfig, deps: StageDeps) -> Self {
        Self {
            config,
            deps,
            guard: OnceCell::new(),
        }
    }

    async fn guard(&self) -> AppResult<&SqlGuard> {
        self.guard
            .get_or_try_init(|| async {
                let database: Arc<dyn SqlDatabase> = match self.deps.database {
                    Some(ref database) => Arc::clone(database),
                    None => Arc::new(SqliteDatabase::open(&self.config.path)?),
                };

                Ok::<_, AppError>(
                    SqlGuard::new(
                        Arc::clone(&self.deps.llm),
                        self.deps.model.clone(),
                        database,
                        self.config.clone(),
                    )
                    .with_templates(
                        self.deps.prompts.sql_query.clone(),
                        self.deps.prompts.sql_summary.clone(),
                    ),
                )
            })
            .await
    }
}

#[async_trait::async_trait]
impl Stage for SqlStage {
    fn kind(&self) -> SourceKind {
        SourceKind::Sql
    }

    async fn initialize(&self) -> AppResult<()> {
        self.guard().await?.schema().await.map(|_| ())
    }

    async fn run(&self, input: &StageInput) -> AppResult<StageContext> {
        let outcome = self.guard().await?.run(input).await?;
        Ok(StageContext::sql(outcome.sql_result(), outcome.sql_query()))
    }
}
