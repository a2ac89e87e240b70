//! Ollama LLM provider implementation.
//!
//! Uses the chat endpoint so that tool calling and multi-turn conversations
//! work the same way as single prompts.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::types::{LlmMessage, Role, ToolCall};
use futures::StreamExt;
use relay_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default endpoint of a local Ollama runtime.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    options: OllamaOptions,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.num_predict.is_none()
            && self.stop.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunction,
}

#[derive(Debug, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Ollama chat response (one object, or one NDJSON line when streaming).
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaChatResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// Optional bearer token for proxied deployments
    api_key: Option<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client against the default local endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Abort requests that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    fn to_ollama_request(&self, request: &LlmRequest, stream: bool) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(OllamaMessage {
                role: Role::System.as_str().to_string(),
                content: system.clone(),
                tool_calls: Vec::new(),
                tool_name: None,
            });
        }
        messages.extend(request.messages.iter().map(to_ollama_message));

        let tools = if stream {
            Vec::new()
        } else {
            request
                .tools
                .iter()
                .map(|tool| OllamaTool {
                    kind: "function",
                    function: OllamaFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect()
        };

        OllamaChatRequest {
            model: request.model.clone(),
            messages,
            stream,
            tools,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
                stop: request.stop.clone(),
            },
        }
    }

    async fn post(&self, body: &OllamaChatRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let mut builder = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn to_ollama_message(message: &LlmMessage) -> OllamaMessage {
    OllamaMessage {
        role: message.role.as_str().to_string(),
        content: message.content.clone(),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| OllamaToolCall {
                function: OllamaFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect(),
        tool_name: message.name.clone(),
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::timeout()
    } else {
        AppError::Llm(format!("Failed to send request to Ollama: {}", e))
    }
}

fn convert_response(response: OllamaChatResponse) -> LlmResponse {
    let usage = response.usage();
    let (content, tool_calls) = match response.message {
        Some(message) => {
            let calls = message
                .tool_calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| {
                    ToolCall::new(format!("call_{}", i), call.function.name, call.function.arguments)
                })
                .collect();
            (message.content, calls)
        }
        None => (String::new(), Vec::new()),
    };

    LlmResponse {
        content,
        model: response.model,
        tool_calls,
        usage,
        done: response.done,
    }
}

fn parse_stream_line(line: &[u8]) -> AppResult<LlmStreamChunk> {
    let response: OllamaChatResponse = serde_json::from_slice(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;

    let usage = response.done.then(|| response.usage());
    Ok(LlmStreamChunk {
        content: response.message.map(|m| m.content).unwrap_or_default(),
        model: response.model,
        done: response.done,
        usage,
    })
}

/// Pop the next complete, non-blank line from the buffer.
fn next_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        if line.iter().any(|b| !b.is_ascii_whitespace()) {
            return Some(line);
        }
    }
    None
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request to Ollama"
        );

        let body = self.to_ollama_request(request, false);
        let response = self.post(&body).await?;

        let chat: OllamaChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AppError::timeout()
            } else {
                AppError::Llm(format!("Failed to parse Ollama response: {}", e))
            }
        })?;

        let response = convert_response(chat);
        tracing::debug!(
            tool_calls = response.tool_calls.len(),
            completion_tokens = response.usage.completion_tokens,
            "Received chat response from Ollama"
        );
        Ok(response)
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming chat request to Ollama");

        let body = self.to_ollama_request(request, true);
        let response = self.post(&body).await?;

        // NDJSON objects may be split across network chunks, so bytes are
        // buffered until a full line is available.
        let bytes = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(
            (bytes, Vec::new(), false),
            |(mut bytes, mut buffer, mut finished)| async move {
                loop {
                    if let Some(line) = next_line(&mut buffer) {
                        return Some((parse_stream_line(&line), (bytes, buffer, finished)));
                    }
                    if finished {
                        let rest = std::mem::take(&mut buffer);
                        if rest.iter().all(|b| b.is_ascii_whitespace()) {
                            return None;
                        }
                        return Some((parse_stream_line(&rest), (bytes, buffer, true)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(e)) => {
                            let err = if e.is_timeout() {
                                AppError::timeout()
                            } else {
                                AppError::Llm(format!("Stream error: {}", e))
                            };
                            return Some((Err(err), (bytes, Vec::new(), true)));
                        }
                        None => finished = true,
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}
