use super::StageDeps;
use crate::stage::{SourceKind, Stage, StageContext};
use relay_core::sources::ApiSourceConfig;
use relay_core::AppResult;
use relay_sources::{ApiGuard, StageInput};
use std::sync::Arc;

/// Guarded API call generation and execution.
pub struct ApiStage {
    guard: ApiGuard,
}

impl ApiStage {
    /// Loads the API schema document.
    pub fn new(config: ApiSourceConfig, deps: &StageDeps) -> AppResult<Self> {
        let mut guard = ApiGuard::new(Arc::clone(&deps.llm), deps.model.clone(), config)?
            .with_templates(
                deps.prompts.api_command.clone(),
                deps.prompts.api_request.clone(),
            );
        if let Some(ref runner) = deps.command_runner {
            guard = guard.with_runner(Arc::clone(runner));
        }
        Ok(Self { guard })
    }
}

#[async_trait::async_trait]
impl Stage for ApiStage {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn run(&self, input: &StageInput) -> AppResult<StageContext> {
        let outcome = self.guard.run(input).await?;
        Ok(StageContext::api(outcome.into_text()))
    }
}
