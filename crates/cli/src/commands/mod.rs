//! Command handlers for the Relay CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod history;
pub mod index;
pub mod sources;

pub use ask::AskCommand;
pub use history::HistoryCommand;
pub use index::IndexCommand;
pub use sources::SourcesCommand;

use relay_core::{config::AppConfig, AppError, AppResult};
use relay_llm::create_client;
use relay_pipeline::{monitor_from_config, SessionPipeline, SqliteHistoryStore};
use relay_prompt::load_prompt_set;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Directory holding prompt template overrides.
pub fn prompts_dir(config: &AppConfig) -> PathBuf {
    config.relay_dir().join("prompts")
}

/// Session pipeline for the workspace configuration, with SQLite history.
pub fn session_pipeline(config: &AppConfig) -> AppResult<SessionPipeline> {
    config.validate()?;

    let endpoint = config.provider_endpoint();
    let api_key = config.resolve_api_key(&config.provider);
    let llm = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())?;

    let prompts = load_prompt_set(&prompts_dir(config))?;
    if !prompts.overridden.is_empty() {
        tracing::debug!("Prompt overrides: {:?}", prompts.overridden);
    }

    let store = SqliteHistoryStore::open(&config.history_path(), config.agent.history_limit)?;
    let monitor = monitor_from_config(config.monitoring.as_ref())?;

    SessionPipeline::builder(llm, config.model.clone())
        .with_sources(config.sources.clone())
        .with_settings(config.agent.clone())
        .with_prompts(prompts)
        .with_history_store(Arc::new(store))
        .with_monitor(monitor)
        .build()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json(value: &Value) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
