//! Source Configuration descriptors.
//!
//! Each source kind has one optional, independently togglable descriptor.
//! A present descriptor activates that source for the lifetime of the
//! pipeline built from it. Descriptors are read from the `sources` section
//! of `.relay/config.yaml` and are immutable once a pipeline is built.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// All source descriptors for one pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Relational database source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSourceConfig>,

    /// External HTTP API source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSourceConfig>,

    /// Document/vector index source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexSourceConfig>,

    /// Tool-server registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolSourceConfig>,
}

impl SourceConfig {
    /// True when no source descriptor is present.
    pub fn is_empty(&self) -> bool {
        self.database.is_none() && self.api.is_none() && self.index.is_none() && self.tools.is_none()
    }

    /// Validate every present descriptor.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(ref database) = self.database {
            database.validate()?;
        }
        if let Some(ref api) = self.api {
            api.validate()?;
        }
        if let Some(ref index) = self.index {
            index.validate()?;
        }
        if let Some(ref tools) = self.tools {
            tools.validate()?;
        }
        Ok(())
    }

    /// Resolve relative file paths against the workspace root.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        if let Some(ref mut database) = self.database {
            if database.path != MEMORY_DATABASE && Path::new(&database.path).is_relative() {
                database.path = workspace.join(&database.path).to_string_lossy().to_string();
            }
        }
        if let Some(ref mut api) = self.api {
            if let Some(ref path) = api.schema_path {
                if path.is_relative() {
                    api.schema_path = Some(workspace.join(path));
                }
            }
        }
        if let Some(ref mut index) = self.index {
            if index.path.is_relative() {
                index.path = workspace.join(&index.path);
            }
        }
    }
}

/// Path value that selects an in-memory SQLite database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Supported database kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Sqlite,
}

/// Database source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSourceConfig {
    #[serde(default)]
    pub kind: DatabaseKind,

    /// Database file path (or `:memory:`)
    pub path: String,

    /// Only describe these tables to the model (all when empty)
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Never describe these tables to the model
    #[serde(default)]
    pub ignore_tables: Vec<String>,

    /// Extra instructions appended to the SQL prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customize_system_message: Option<String>,

    /// Probe counts at or above this value are rejected as too big
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: u64,

    /// Run the COUNT probe before executing generated statements
    #[serde(default = "default_true")]
    pub probe: bool,
}

fn default_max_result_rows() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl DatabaseSourceConfig {
    /// Descriptor for a database file with default limits.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            kind: DatabaseKind::Sqlite,
            path: path.into(),
            include_tables: Vec::new(),
            ignore_tables: Vec::new(),
            customize_system_message: None,
            max_result_rows: default_max_result_rows(),
            probe: true,
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.path.trim().is_empty() {
            return Err(AppError::Config("Database source requires a path".to_string()));
        }
        if self.max_result_rows == 0 {
            return Err(AppError::Config(
                "Database source maxResultRows must be greater than zero".to_string(),
            ));
        }
        if let Some(table) = self.include_tables.iter().find(|t| self.ignore_tables.contains(t)) {
            return Err(AppError::Config(format!(
                "Table '{}' is both included and ignored",
                table
            )));
        }
        Ok(())
    }
}

/// How the API guard turns a question into a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// The model writes a curl command that is executed as a process
    #[default]
    Command,
    /// The model writes a JSON request description executed over HTTP
    Request,
}

/// External API source descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSourceConfig {
    /// Inline API schema document (OpenAPI/Swagger, any text form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Path to the schema document, used when `schema` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customize_system_message: Option<String>,

    /// Sent as `x-api-key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_api_key: Option<String>,

    /// Sent as `Authorization`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,

    /// Additional fixed headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub mode: ApiMode,
}

fn default_api_timeout_ms() -> u64 {
    30_000
}

impl ApiSourceConfig {
    /// Descriptor with an inline schema and default timeout.
    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            timeout_ms: default_api_timeout_ms(),
            ..Default::default()
        }
    }

    /// Load the schema document, reading `schemaPath` when needed.
    pub fn load_schema(&self) -> AppResult<String> {
        if let Some(ref schema) = self.schema {
            return Ok(schema.clone());
        }
        let path = self
            .schema_path
            .as_ref()
            .ok_or_else(|| AppError::Config("API source requires schema or schemaPath".to_string()))?;
        std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read API schema {:?}: {}", path, e))
        })
    }

    /// Authentication and fixed headers, in a stable order.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(ref key) = self.x_api_key {
            headers.push(("x-api-key".to_string(), key.clone()));
        }
        if let Some(ref auth) = self.authorization {
            headers.push(("Authorization".to_string(), auth.clone()));
        }
        for (name, value) in &self.headers {
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> AppResult<()> {
        match (&self.schema, &self.schema_path) {
            (Some(schema), _) if schema.trim().is_empty() => Err(AppError::Config(
                "API source schema cannot be empty".to_string(),
            )),
            (None, None) => Err(AppError::Config(
                "API source requires schema or schemaPath".to_string(),
            )),
            _ if self.timeout_ms == 0 => Err(AppError::Config(
                "API source timeoutMs must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Embedding settings for the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// "trigram" (offline, deterministic) or "ollama"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_embedding_provider() -> String {
    "trigram".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            endpoint: None,
        }
    }
}

/// Document index source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSourceConfig {
    /// SQLite file holding the index
    pub path: PathBuf,

    /// Metadata filter, may contain `(key)` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

fn default_top_k() -> usize {
    10
}

impl IndexSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filter: None,
            top_k: default_top_k(),
            embedding: EmbeddingSettings::default(),
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.top_k == 0 {
            return Err(AppError::Config("Index source topK must be greater than zero".to_string()));
        }
        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Index embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport used to reach one tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolServerTransport {
    /// Standard-I/O subprocess
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Streamable HTTP endpoint
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Reconnect once when a call fails
        #[serde(default)]
        reconnect: bool,
    },
}

/// One named tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub name: String,
    pub transport: ToolServerTransport,
}

/// Tool-server registry descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSourceConfig {
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customize_system_message: Option<String>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_max_tool_errors")]
    pub max_tool_errors: usize,

    #[serde(default = "default_true")]
    pub prefix_tool_name_with_server_name: bool,
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_tool_errors() -> usize {
    3
}

impl Default for ToolSourceConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            customize_system_message: None,
            max_iterations: default_max_iterations(),
            max_tool_errors: default_max_tool_errors(),
            prefix_tool_name_with_server_name: true,
        }
    }
}

impl ToolSourceConfig {
    fn validate(&self) -> AppResult<()> {
        if self.max_iterations == 0 {
            return Err(AppError::Config(
                "Tool source maxIterations must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(AppError::Config("Tool server name cannot be empty".to_string()));
            }
            if !names.insert(server.name.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate tool server name: {}",
                    server.name
                )));
            }
            match &server.transport {
                ToolServerTransport::Stdio { command, .. } if command.trim().is_empty() => {
                    return Err(AppError::Config(format!(
                        "Tool server '{}' has an empty command",
                        server.name
                    )));
                }
                ToolServerTransport::Http { url, .. } if url.trim().is_empty() => {
                    return Err(AppError::Config(format!(
                        "Tool server '{}' has an empty url",
                        server.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Monitoring collaborator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}
