//! Session pipeline: conversational history around a composed pipeline.
//!
//! Every turn reads the session's bounded history, runs the composed
//! pipeline (to completion or streaming), and appends the question and final
//! answer only once the answer is complete. Turns on the same session id are
//! queued so their history reads and appends never interleave. Turns without
//! a session id run without history.

use crate::assembler::{ComposedPipeline, PipelineAssembler, PipelineOutput};
use crate::history::{format_messages, ChatHistory, HistoryStore, MemoryHistoryStore};
use crate::monitor::{Monitor, RunRecord, TracingMonitor};
use crate::registry::StageRegistry;
use crate::stage::{SourceKind, StageContext};
use crate::stages::StageDeps;
use chrono::Utc;
use relay_core::sources::SourceConfig;
use relay_core::{AgentSettings, AppError, AppResult};
use relay_knowledge::DocumentIndex;
use relay_llm::LlmClient;
use relay_prompt::PromptSet;
use relay_sources::{Agent, AgentRequest, CommandRunner, SqlDatabase, StageInput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;
use uuid::Uuid;

/// Reason carried by the end event of a completed turn.
pub const END_REASON: &str = "terminated";

/// One question from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    pub question: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_session_id: Option<String>,

    #[serde(default, rename = "chatThreadID", skip_serializing_if = "Option::is_none")]
    pub chat_thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Emit token events from [`SessionPipeline::call`]
    #[serde(default)]
    pub stream: bool,
}

impl TurnInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.user_session_id = Some(session_id.into());
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.chat_thread_id = Some(thread_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// History key: the chat thread, then the user session. Blank ids count
    /// as missing; `None` means the turn is anonymous.
    pub fn session_key(&self) -> Option<String> {
        self.chat_thread_id
            .iter()
            .chain(self.user_session_id.iter())
            .find(|id| !id.trim().is_empty())
            .cloned()
    }
}

impl From<AgentRequest> for TurnInput {
    fn from(request: AgentRequest) -> Self {
        Self {
            question: request.question,
            user_session_id: request.user_session_id,
            chat_thread_id: request.chat_thread_id,
            context: request.context,
            stream: false,
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutput {
    pub answer: String,
    pub session_id: String,
    pub run_id: String,
    pub context: StageContext,
}

/// Events emitted by [`SessionPipeline::call`].
///
/// A turn emits either `Message` then `End`, or a single `Error`.
#[derive(Debug)]
pub enum TurnEvent {
    Token(String),
    Message(String),
    End(String),
    Error(AppError),
}

/// A composed pipeline bound to a history store.
pub struct SessionPipeline {
    name: String,
    description: String,
    pipeline: ComposedPipeline,
    store: Arc<dyn HistoryStore>,
    monitor: Arc<dyn Monitor>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionPipeline {
    pub fn builder(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> SessionPipelineBuilder {
        SessionPipelineBuilder::new(llm, model)
    }

    pub fn kinds(&self) -> Vec<SourceKind> {
        self.pipeline.kinds()
    }

    pub fn system_template(&self) -> String {
        self.pipeline.system_template()
    }

    pub fn history_store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Open source connections ahead of the first turn.
    pub async fn initialize(&self) {
        self.pipeline.initialize().await;
    }

    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        tracing::debug!(name = %self.name, "Pipeline shut down");
    }

    /// Run one turn to completion.
    pub async fn invoke(&self, input: TurnInput) -> AppResult<TurnOutput> {
        self.turn(input, None).await
    }

    /// Run one turn, sending answer chunks to `tokens` as they arrive.
    pub async fn stream(&self, input: TurnInput, tokens: mpsc::Sender<String>) -> AppResult<TurnOutput> {
        self.turn(input, Some(tokens)).await
    }

    /// Run one turn and report it as events.
    ///
    /// Streams when `input.stream` is set. Errors are delivered as
    /// [`TurnEvent::Error`] rather than returned.
    pub async fn call(&self, input: TurnInput, events: mpsc::Sender<TurnEvent>) {
        let result = if input.stream {
            let (tokens, mut chunks) = mpsc::channel::<String>(64);
            let forward = async {
                while let Some(chunk) = chunks.recv().await {
                    emit(&events, TurnEvent::Token(chunk)).await;
                }
            };
            let (result, ()) = tokio::join!(self.stream(input, tokens), forward);
            result
        } else {
            self.invoke(input).await
        };

        match result {
            Ok(output) => {
                emit(&events, TurnEvent::Message(output.answer)).await;
                emit(&events, TurnEvent::End(END_REASON.to_string())).await;
            }
            Err(e) => emit(&events, TurnEvent::Error(e)).await,
        }
    }

    async fn turn(
        &self,
        input: TurnInput,
        tokens: Option<mpsc::Sender<String>>,
    ) -> AppResult<TurnOutput> {
        if input.question.trim().is_empty() {
            return Err(AppError::Pipeline("Question is required".to_string()));
        }

        let key = input.session_key();
        let session_id = key.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", session = %session_id, run_id = %run_id);

        async {
            let start_time = Utc::now();
            let result = match key {
                Some(ref key) => self.run_queued(&input, key, tokens).await,
                None => self.run_turn(&input, &session_id, None, tokens).await,
            };

            self.monitor
                .record(&RunRecord {
                    id: run_id.clone(),
                    name: self.name.clone(),
                    session_id: session_id.clone(),
                    question: input.question.clone(),
                    answer: result.as_ref().ok().map(|o| o.answer.clone()),
                    error: result.as_ref().err().map(|e| e.to_string()),
                    sources: self.kinds().iter().map(|k| k.as_str().to_string()).collect(),
                    project: None,
                    start_time,
                    end_time: Utc::now(),
                })
                .await;

            match result {
                Ok(output) => Ok(TurnOutput {
                    answer: output.answer,
                    session_id: session_id.clone(),
                    run_id: run_id.clone(),
                    context: output.context,
                }),
                Err(e) => {
                    tracing::error!(error = %e, "Turn failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_queued(
        &self,
        input: &TurnInput,
        session_id: &str,
        tokens: Option<mpsc::Sender<String>>,
    ) -> AppResult<PipelineOutput> {
        let lock = self.session_lock(session_id).await;
        let result = {
            let _queued = lock.lock().await;
            match self.store.history(session_id).await {
                Ok(history) => self.run_turn(input, session_id, Some(history), tokens).await,
                Err(e) => Err(e),
            }
        };
        drop(lock);
        self.release_session(session_id).await;
        result
    }

    async fn run_turn(
        &self,
        input: &TurnInput,
        session_id: &str,
        history: Option<Arc<dyn ChatHistory>>,
        tokens: Option<mpsc::Sender<String>>,
    ) -> AppResult<PipelineOutput> {
        let messages = match history {
            Some(ref history) => history.get_messages().await?,
            None => Vec::new(),
        };
        let formatted = format_messages(&messages);
        tracing::debug!(messages = messages.len(), "Loaded history");

        let mut stage_input = StageInput::new(input.question.clone())
            .with_history(messages, formatted)
            .with_context(input.context.clone().unwrap_or_default())
            .with_session(session_id);
        stage_input.chat_thread_id = input.chat_thread_id.clone();

        let output = match tokens {
            Some(tokens) => self.pipeline.stream(&stage_input, tokens).await?,
            None => self.pipeline.invoke(&stage_input).await?,
        };

        if let Some(history) = history {
            history.add_user_message(&input.question).await?;
            history.add_ai_message(&output.answer).await?;
        }
        Ok(output)
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    async fn release_session(&self, session_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }
}

async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    if events.send(event).await.is_err() {
        tracing::trace!("Event receiver closed");
    }
}

#[async_trait::async_trait]
impl Agent for SessionPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn ask(&self, request: AgentRequest) -> AppResult<String> {
        Ok(self.invoke(request.into()).await?.answer)
    }
}

impl fmt::Debug for SessionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPipeline")
            .field("name", &self.name)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Collects configuration and collaborators for a [`SessionPipeline`].
pub struct SessionPipelineBuilder {
    llm: Arc<dyn LlmClient>,
    model: String,
    sources: SourceConfig,
    settings: AgentSettings,
    prompts: PromptSet,
    registry: StageRegistry,
    store: Option<Arc<dyn HistoryStore>>,
    monitor: Option<Arc<dyn Monitor>>,
    agents: Vec<Arc<dyn Agent>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
    database: Option<Arc<dyn SqlDatabase>>,
    document_index: Option<Arc<dyn DocumentIndex>>,
}

impl SessionPipelineBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            sources: SourceConfig::default(),
            settings: AgentSettings::default(),
            prompts: PromptSet::default(),
            registry: StageRegistry::default(),
            store: None,
            monitor: None,
            agents: Vec::new(),
            command_runner: None,
            database: None,
            document_index: None,
        }
    }

    pub fn with_sources(mut self, sources: SourceConfig) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Defaults to an in-memory store bounded by the settings' history limit.
    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Offer another agent to the tool loop.
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    pub fn with_database(mut self, database: Arc<dyn SqlDatabase>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_document_index(mut self, index: Arc<dyn DocumentIndex>) -> Self {
        self.document_index = Some(index);
        self
    }

    pub fn build(self) -> AppResult<SessionPipeline> {
        let mut deps = StageDeps::new(self.llm, self.model)
            .with_prompts(self.prompts)
            .with_temperature(self.settings.temperature);
        for agent in self.agents {
            deps = deps.with_agent(agent);
        }
        if let Some(runner) = self.command_runner {
            deps = deps.with_command_runner(runner);
        }
        if let Some(database) = self.database {
            deps = deps.with_database(database);
        }
        if let Some(index) = self.document_index {
            deps = deps.with_document_index(index);
        }

        let pipeline = PipelineAssembler::new()
            .with_registry(self.registry)
            .build(&self.sources, deps, self.settings.system_message.clone())?
            .with_max_tokens(self.settings.max_tokens);

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryHistoryStore::new(self.settings.history_limit)));
        let monitor = self.monitor.unwrap_or_else(|| Arc::new(TracingMonitor));

        let description = self
            .settings
            .description
            .clone()
            .unwrap_or_else(|| format!("Ask {} a question", self.settings.name));

        Ok(SessionPipeline {
            name: self.settings.name,
            description,
            pipeline,
            store,
            monitor,
            locks: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_prefers_thread() {
        let input = TurnInput::new("q").with_session("user-1").with_thread("thread-9");
        assert_eq!(input.session_key().as_deref(), Some("thread-9"));

        let input = TurnInput::new("q").with_session("user-1");
        assert_eq!(input.session_key().as_deref(), Some("user-1"));
    }

    #[test]
    fn test_anonymous_turns_have_no_key() {
        assert_eq!(TurnInput::new("q").session_key(), None);
        assert_eq!(TurnInput::new("q").with_thread("  ").session_key(), None);
        assert_eq!(
            TurnInput::new("q").with_thread("  ").with_session("u").session_key().as_deref(),
            Some("u")
        );
    }

    #[test]
    fn test_turn_input_json() {
        let input: TurnInput = serde_json::from_str(
            r#"{"question":"hi","chatThreadID":"t1","userSessionId":"u1","stream":true}"#,
        )
        .unwrap();
        assert_eq!(input.chat_thread_id.as_deref(), Some("t1"));
        assert_eq!(input.user_session_id.as_deref(), Some("u1"));
        assert!(input.stream);
        assert_eq!(input.context, None);
    }

    #[test]
    fn test_agent_request_conversion() {
        let request = AgentRequest {
            question: "q".to_string(),
            chat_thread_id: Some("t".to_string()),
            ..AgentRequest::default()
        };
        let input = TurnInput::from(request);
        assert_eq!(input.session_key().as_deref(), Some("t"));
        assert!(!input.stream);
    }
}
