//! Configuration management for Relay.
//!
//! Configuration is loaded and merged from several layers, lowest first:
//! - Built-in defaults
//! - The workspace config file (`.relay/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Besides the model provider settings, the config file carries the agent
//! settings and the source descriptors used to assemble a pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::sources::{MonitoringConfig, SourceConfig};

/// Name of the per-workspace state directory.
pub const RELAY_DIR: &str = ".relay";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .relay/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider (e.g., "ollama")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Agent-level settings
    pub agent: AgentSettings,

    /// Source descriptors
    pub sources: SourceConfig,

    /// Monitoring collaborator
    pub monitoring: Option<MonitoringConfig>,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    pub active_provider: String,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Agent settings shared by every turn of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// User rules rendered into the answer prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Number of past messages read into each turn
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_agent_name() -> String {
    "Relay".to_string()
}

fn default_history_limit() -> usize {
    5
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: None,
            system_message: None,
            history_limit: default_history_limit(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    agent: Option<AgentSettings>,
    sources: Option<SourceConfig>,
    monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            agent: AgentSettings::default(),
            sources: SourceConfig::default(),
            monitoring: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, config file and defaults.
    ///
    /// Environment variables:
    /// - `RELAY_WORKSPACE`: Override workspace path
    /// - `RELAY_CONFIG`: Path to config file
    /// - `RELAY_PROVIDER`: LLM provider
    /// - `RELAY_MODEL`: Model identifier
    /// - `RELAY_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RELAY_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RELAY_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.relay_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(provider) = std::env::var("RELAY_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RELAY_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("RELAY_API_KEY").ok();
        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = if contents.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(contents)?
        };

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model.clone();
            }
            result.llm = Some(llm);
        }

        if let Some(agent) = config_file.agent {
            result.agent = agent;
        }

        if let Some(mut sources) = config_file.sources {
            sources.resolve_paths(&result.workspace);
            result.sources = sources;
        }

        if let Some(monitoring) = config_file.monitoring {
            result.monitoring = Some(monitoring);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .relay directory.
    pub fn relay_dir(&self) -> PathBuf {
        self.workspace.join(RELAY_DIR)
    }

    /// Ensure the .relay directory exists.
    pub fn ensure_relay_dir(&self) -> AppResult<()> {
        let relay_dir = self.relay_dir();
        if !relay_dir.exists() {
            std::fs::create_dir_all(&relay_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .relay directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Path of the SQLite file holding conversation history.
    pub fn history_path(&self) -> PathBuf {
        self.relay_dir().join("history.sqlite")
    }

    /// Get the configuration for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint for the active provider, if configured.
    pub fn provider_endpoint(&self) -> Option<String> {
        self.get_provider_config(&self.provider)
            .and_then(|p| p.endpoint.clone())
    }

    /// Resolve the API key for a provider.
    ///
    /// `RELAY_API_KEY` wins over the provider's `apiKeyEnv` variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        self.get_provider_config(provider)
            .and_then(|p| p.api_key_env.as_ref())
            .and_then(|env_var| std::env::var(env_var).ok())
    }

    /// Validate the active provider and every source descriptor.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama"];
        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if let Some(env_var) = self
            .get_provider_config(&self.provider)
            .and_then(|p| p.api_key_env.as_ref())
        {
            if self.api_key.is_none() && std::env::var(env_var).is_err() {
                return Err(AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    env_var
                )));
            }
        }

        if self.agent.history_limit == 0 {
            return Err(AppError::Config(
                "agent.historyLimit must be greater than zero".to_string(),
            ));
        }

        self.sources.validate()
    }
}
