//! Error types for Relay.
//!
//! This module defines a unified error enum that covers every error category
//! in the workspace: configuration, I/O, model calls, prompt rendering, the
//! individual sources (index, SQL, API, tools), history and the pipeline itself.

use thiserror::Error;

/// Message used for every aborted network or process call.
pub const TIMEOUT_MESSAGE: &str = "Request timeout";

/// Stable code attached to timeouts.
pub const TIMEOUT_CODE: &str = "ETIMEDOUT";

/// Unified error type for Relay.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Document index and embedding errors
    #[error("Index error: {0}")]
    Index(String),

    /// Database errors raised while generating, probing or running SQL
    #[error("SQL error: {0}")]
    Sql(String),

    /// External API errors
    #[error("API error: {0}")]
    Api(String),

    /// Tool discovery and invocation errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// An aborted network or process call
    #[error("{message} ({code})")]
    Timeout { message: String, code: String },

    /// Conversation history errors
    #[error("History error: {0}")]
    History(String),

    /// Pipeline assembly and turn errors
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// The normalized timeout error.
    pub fn timeout() -> Self {
        AppError::Timeout {
            message: TIMEOUT_MESSAGE.to_string(),
            code: TIMEOUT_CODE.to_string(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &str {
        match self {
            AppError::Config(_) => "CONFIG",
            AppError::Io(_) => "IO",
            AppError::Llm(_) => "LLM",
            AppError::Prompt(_) => "PROMPT",
            AppError::Index(_) => "INDEX",
            AppError::Sql(_) => "SQL",
            AppError::Api(_) => "API",
            AppError::Tool(_) => "TOOL",
            AppError::Timeout { code, .. } => code,
            AppError::History(_) => "HISTORY",
            AppError::Pipeline(_) => "PIPELINE",
            AppError::Serialization(_) => "SERIALIZATION",
            AppError::Other(_) => "OTHER",
        }
    }

    /// Whether this error is the normalized timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
