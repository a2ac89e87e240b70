//! MCP tool-server registry.
//!
//! Connects every configured server, lists its tools and exposes each one as
//! a [`Tool`]. Stdio servers run as child processes; HTTP servers use the
//! streamable HTTP transport.

use super::tool::Tool;
use relay_core::sources::{ToolServerConfig, ToolServerTransport, ToolSourceConfig};
use relay_core::{AppError, AppResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{
    model::{CallToolRequestParam, Content, RawContent},
    service::{RoleClient, RunningService, ServiceExt},
    transport::TokioChildProcess,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::RwLock;

type McpService = RunningService<RoleClient, ()>;

/// Name a server tool is exposed under.
pub fn qualified_tool_name(server: &str, tool: &str, prefix: bool) -> String {
    if prefix {
        format!("mcp__{}__{}", server, tool)
    } else {
        tool.to_string()
    }
}

/// Text parts of a tool result, newline-joined.
fn text_content(contents: Vec<Content>) -> String {
    contents
        .into_iter()
        .filter_map(|c| match c.raw {
            RawContent::Text(text) => Some(text.text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn header_map(headers: &BTreeMap<String, String>) -> AppResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::Config(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::Config(format!("Invalid header value for '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn connect_service(config: &ToolServerConfig) -> AppResult<McpService> {
    match &config.transport {
        ToolServerTransport::Stdio { command, args, env } => {
            let mut cmd = Command::new(command);
            cmd.args(args);
            for (key, value) in env {
                cmd.env(key, value);
            }

            let transport = TokioChildProcess::new(cmd).map_err(|e| {
                AppError::Tool(format!("Failed to spawn tool server '{}': {}", config.name, e))
            })?;
            ().serve(transport).await.map_err(|e| {
                AppError::Tool(format!("Failed to connect to tool server '{}': {}", config.name, e))
            })
        }
        ToolServerTransport::Http { url, headers, .. } => {
            let client = reqwest::Client::builder()
                .default_headers(header_map(headers)?)
                .build()
                .map_err(|e| AppError::Tool(format!("Failed to create HTTP client: {}", e)))?;
            let transport = StreamableHttpClientTransport::with_client(
                client,
                StreamableHttpClientTransportConfig::with_uri(url.clone()),
            );
            ().serve(transport).await.map_err(|e| {
                AppError::Tool(format!("Failed to connect to tool server '{}': {}", config.name, e))
            })
        }
    }
}

enum CallFailure {
    /// The connection or protocol failed
    Transport(String),
    /// The server ran the tool and reported an error
    Tool(String),
}

impl CallFailure {
    fn into_error(self, tool: &str) -> AppError {
        match self {
            CallFailure::Transport(reason) => {
                AppError::Tool(format!("Call to '{}' failed: {}", tool, reason))
            }
            CallFailure::Tool(text) => AppError::Tool(format!("'{}' returned an error: {}", tool, text)),
        }
    }
}

/// One connected server.
struct McpServer {
    config: ToolServerConfig,
    service: RwLock<Option<McpService>>,
}

impl McpServer {
    fn reconnects(&self) -> bool {
        matches!(
            self.config.transport,
            ToolServerTransport::Http { reconnect: true, .. }
        )
    }

    async fn try_call(&self, tool: &str, args: &Value) -> Result<String, CallFailure> {
        let guard = self.service.read().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| CallFailure::Transport("server is not connected".to_string()))?;

        let result = service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments: args.as_object().cloned(),
                task: None,
                meta: None,
            })
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        let is_error = result.is_error.unwrap_or(false);
        let text = text_content(result.content);
        if is_error {
            Err(CallFailure::Tool(text))
        } else {
            Ok(text)
        }
    }

    async fn call(&self, tool: &str, args: &Value) -> AppResult<String> {
        match self.try_call(tool, args).await {
            Err(CallFailure::Transport(reason)) if self.reconnects() => {
                tracing::warn!(server = %self.config.name, error = %reason, "Tool call failed, reconnecting");
                self.reconnect().await?;
                self.try_call(tool, args).await.map_err(|f| f.into_error(tool))
            }
            other => other.map_err(|f| f.into_error(tool)),
        }
    }

    async fn reconnect(&self) -> AppResult<()> {
        let mut guard = self.service.write().await;
        if let Some(old) = guard.take() {
            if let Err(e) = old.cancel().await {
                tracing::debug!(server = %self.config.name, error = ?e, "Failed to close stale connection");
            }
        }
        *guard = Some(connect_service(&self.config).await?);
        Ok(())
    }

    async fn close(&self) {
        if let Some(service) = self.service.write().await.take() {
            if let Err(e) = service.cancel().await {
                tracing::warn!(server = %self.config.name, error = ?e, "Failed to close tool server");
            }
        }
    }
}

/// A tool hosted by an MCP server.
pub struct McpTool {
    server: Arc<McpServer>,
    remote_name: String,
    name: String,
    description: String,
    input_schema: Value,
}

#[async_trait::async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn call(&self, args: Value) -> AppResult<String> {
        self.server.call(&self.remote_name, &args).await
    }
}

impl fmt::Debug for McpTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpTool")
            .field("server", &self.server.config.name)
            .field("name", &self.name)
            .finish()
    }
}

/// Connected tool servers and the tools they expose.
#[derive(Default)]
pub struct McpRegistry {
    servers: Vec<Arc<McpServer>>,
    tools: Vec<Arc<dyn Tool>>,
}

impl McpRegistry {
    /// Connect every configured server and list its tools.
    pub async fn connect(config: &ToolSourceConfig) -> AppResult<Self> {
        let mut registry = Self::default();

        for server_config in &config.servers {
            let service = match connect_service(server_config).await {
                Ok(service) => service,
                Err(e) => {
                    registry.shutdown().await;
                    return Err(e);
                }
            };
            let listed = match service.list_tools(None).await {
                Ok(listed) => listed,
                Err(e) => {
                    if let Err(e) = service.cancel().await {
                        tracing::debug!(server = %server_config.name, error = ?e, "Failed to close tool server");
                    }
                    registry.shutdown().await;
                    return Err(AppError::Tool(format!(
                        "Failed to list tools of '{}': {}",
                        server_config.name, e
                    )));
                }
            };

            let server = Arc::new(McpServer {
                config: server_config.clone(),
                service: RwLock::new(Some(service)),
            });

            for t in listed.tools {
                let remote_name = t.name.to_string();
                registry.tools.push(Arc::new(McpTool {
                    server: Arc::clone(&server),
                    name: qualified_tool_name(
                        &server_config.name,
                        &remote_name,
                        config.prefix_tool_name_with_server_name,
                    ),
                    remote_name,
                    description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                    input_schema: Value::Object(Arc::unwrap_or_clone(t.input_schema)),
                }));
            }

            tracing::info!(server = %server_config.name, "Connected tool server");
            registry.servers.push(server);
        }

        Ok(registry)
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.config.name.clone()).collect()
    }

    /// Close every server connection.
    pub async fn shutdown(&self) {
        for server in &self.servers {
            server.close().await;
        }
    }
}

impl fmt::Debug for McpRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpRegistry")
            .field("servers", &self.server_names())
            .field("tools", &self.tools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_tool_name() {
        assert_eq!(qualified_tool_name("files", "read", true), "mcp__files__read");
        assert_eq!(qualified_tool_name("files", "read", false), "read");
    }

    #[test]
    fn test_text_content_joins_text_parts() {
        let contents = vec![Content::text("first"), Content::text("second")];
        assert_eq!(text_content(contents), "first\nsecond");
        assert_eq!(text_content(Vec::new()), "");
    }

    #[test]
    fn test_header_map() {
        let mut headers = BTreeMap::new();
        headers.insert("x-api-key".to_string(), "k1".to_string());
        let map = header_map(&headers).unwrap();
        assert_eq!(map.get("x-api-key").unwrap(), "k1");

        let mut bad = BTreeMap::new();
        bad.insert("bad header".to_string(), "v".to_string());
        assert!(header_map(&bad).is_err());
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = McpRegistry::connect(&ToolSourceConfig::default()).await.unwrap();
        assert!(registry.tools().is_empty());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_stdio_server_fails() {
        let config = ToolSourceConfig {
            servers: vec![ToolServerConfig {
                name: "ghost".to_string(),
                transport: ToolServerTransport::Stdio {
                    command: "relay-no-such-server".to_string(),
                    args: Vec::new(),
                    env: BTreeMap::new(),
                },
            }],
            ..ToolSourceConfig::default()
        };
        match McpRegistry::connect(&config).await {
            Err(AppError::Tool(message)) => assert!(message.contains("'ghost'")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
