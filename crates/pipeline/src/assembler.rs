//! Pipeline assembly and the composed per-turn callable.
//!
//! A composed pipeline fans a turn out to every active stage, merges their
//! partial contexts and feeds the result into the final answer prompt. A
//! failing stage never aborts the turn: its keys carry an error string the
//! model can acknowledge instead.

use crate::registry::StageRegistry;
use crate::stage::{SourceKind, Stage, StageContext};
use crate::stages::StageDeps;
use futures::future::join_all;
use futures::StreamExt;
use relay_core::sources::SourceConfig;
use relay_core::AppResult;
use relay_llm::{LlmClient, LlmMessage, LlmRequest};
use relay_prompt::PromptComposer;
use relay_sources::StageInput;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Answer plus the context it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub answer: String,
    pub context: StageContext,
}

/// Builds composed pipelines from source configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineAssembler {
    registry: StageRegistry,
}

impl PipelineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the pipeline for `config`.
    ///
    /// Only stage objects are created here; their connections open on first
    /// use, so building twice from the same configuration is harmless.
    pub fn build(
        &self,
        config: &SourceConfig,
        deps: StageDeps,
        user_rules: Option<String>,
    ) -> AppResult<ComposedPipeline> {
        let stages = self.registry.build(config, &deps)?;

        let composer = stages.iter().fold(
            PromptComposer::new(deps.prompts.answer.clone()),
            |composer, stage| composer.with_fragment(stage.kind().fragment()),
        );

        tracing::info!(
            stages = ?stages.iter().map(|s| s.kind().as_str()).collect::<Vec<_>>(),
            "Assembled pipeline"
        );

        Ok(ComposedPipeline {
            stages,
            composer,
            llm: deps.llm,
            model: deps.model,
            temperature: deps.temperature,
            max_tokens: None,
            user_rules: user_rules.unwrap_or_default(),
        })
    }
}

/// Active stages plus the answer step.
pub struct ComposedPipeline {
    stages: Vec<Arc<dyn Stage>>,
    composer: PromptComposer,
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    user_rules: String,
}

impl ComposedPipeline {
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Active source kinds, in stage order.
    pub fn kinds(&self) -> Vec<SourceKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// The unrendered answer system prompt.
    pub fn system_template(&self) -> String {
        self.composer.template()
    }

    /// Open every stage's connections ahead of the first turn.
    ///
    /// A stage that cannot connect is only logged; it retries on its next run
    /// and reports the failure through its context keys like any other.
    pub async fn initialize(&self) {
        for stage in &self.stages {
            if let Err(e) = stage.initialize().await {
                tracing::warn!(kind = %stage.kind(), error = %e, "Stage failed to initialize");
            }
        }
    }

    /// Close every stage's connections.
    pub async fn shutdown(&self) {
        for stage in &self.stages {
            stage.shutdown().await;
        }
    }

    /// Run every active stage concurrently and merge their contexts.
    pub async fn gather(&self, input: &StageInput) -> StageContext {
        let runs = self.stages.iter().map(|stage| {
            let kind = stage.kind();
            async move {
                match stage.run(input).await {
                    Ok(context) => context,
                    Err(e) => {
                        tracing::warn!(error = %e, "Stage failed");
                        StageContext::failed(kind, format!("{} stage failed: {}", kind, e))
                    }
                }
            }
            .instrument(tracing::info_span!("stage", kind = %kind))
        });

        join_all(runs)
            .await
            .into_iter()
            .fold(StageContext::default(), StageContext::merge)
    }

    /// The answer request for a gathered context.
    pub fn answer_request(&self, input: &StageInput, context: &StageContext) -> AppResult<LlmRequest> {
        let system = self
            .composer
            .render(&context.variables(&self.user_rules, &input.user_context))?;

        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(LlmMessage::system(system));
        messages.extend(input.history.iter().cloned());
        messages.push(LlmMessage::user(input.question.clone()));

        Ok(LlmRequest::from_messages(messages, &self.model)
            .with_sampling(self.temperature, self.max_tokens))
    }

    /// Run the turn to completion.
    pub async fn invoke(&self, input: &StageInput) -> AppResult<PipelineOutput> {
        let context = self.gather(input).await;
        let request = self.answer_request(input, &context)?;
        let response = self.llm.complete(&request).await?;

        Ok(PipelineOutput {
            answer: response.content,
            context,
        })
    }

    /// Run the turn, sending answer chunks to `tokens` as they arrive.
    ///
    /// The returned answer is the concatenation of the chunks sent. A closed
    /// receiver does not stop generation.
    pub async fn stream(
        &self,
        input: &StageInput,
        tokens: mpsc::Sender<String>,
    ) -> AppResult<PipelineOutput> {
        let context = self.gather(input).await;
        let request = self.answer_request(input, &context)?.with_streaming();
        let mut stream = self.llm.stream(&request).await?;

        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.content.is_empty() {
                answer.push_str(&chunk.content);
                if tokens.send(chunk.content).await.is_err() {
                    tracing::trace!("Token receiver closed");
                }
            }
            if chunk.done {
                break;
            }
        }

        Ok(PipelineOutput { answer, context })
    }
}

impl fmt::Debug for ComposedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedPipeline")
            .field("stages", &self.kinds())
            .field("model", &self.model)
            .finish()
    }
}
