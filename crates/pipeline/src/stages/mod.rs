//! Stage implementations, one per source kind.
//!
//! Stages are cheap to construct. Database files, index files and tool
//! servers are opened on first use (or in [`Stage::initialize`]) and cached
//! for the life of the pipeline.
//!
//! [`Stage::initialize`]: crate::stage::Stage::initialize

mod api;
mod documents;
mod sql;
mod tools;

pub use api::ApiStage;
pub use documents::DocumentsStage;
pub use sql::SqlStage;
pub use tools::ToolsStage;

use relay_knowledge::DocumentIndex;
use relay_llm::LlmClient;
use relay_prompt::PromptSet;
use relay_sources::{Agent, CommandRunner, SqlDatabase};
use std::fmt;
use std::sync::Arc;

/// Collaborators shared by every stage of one pipeline.
#[derive(Clone)]
pub struct StageDeps {
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub prompts: PromptSet,
    pub temperature: Option<f32>,

    /// Agents offered to the tool loop next to MCP tools
    pub agents: Vec<Arc<dyn Agent>>,

    /// Replaces the process runner of the API stage
    pub command_runner: Option<Arc<dyn CommandRunner>>,

    /// Replaces the database opened from configuration
    pub database: Option<Arc<dyn SqlDatabase>>,

    /// Replaces the index opened from configuration
    pub document_index: Option<Arc<dyn DocumentIndex>>,
}

impl StageDeps {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            prompts: PromptSet::default(),
            temperature: None,
            agents: Vec::new(),
            command_runner: None,
            database: None,
            document_index: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

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
}

impl fmt::Debug for StageDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDeps")
            .field("provider", &self.llm.provider_name())
            .field("model", &self.model)
            .field("agents", &self.agents.len())
            .finish()
    }
}
