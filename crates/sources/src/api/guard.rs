//! External API execution guard.
//!
//! The model sees the API schema and writes either a curl command (command
//! mode) or a JSON request description (request mode). Authentication
//! headers come from configuration and are added after parsing, so the model
//! never sees or invents them.

use super::parser::{command_argv, parse_command, parse_request, with_headers, ApiRequest};
use super::runner::{CommandRunner, ProcessRunner};
use crate::input::StageInput;
use relay_core::sources::{ApiMode, ApiSourceConfig};
use relay_core::{AppError, AppResult};
use relay_llm::{LlmClient, LlmRequest};
use relay_prompt::render_template;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Prefix of every successful execution result.
pub const SUCCESS_PREFIX: &str = "Request executed successfully and returned: ";

/// Result text for a request answered with a non-2xx status.
pub const REQUEST_ERROR: &str = "Request Error";

/// Terminal state of one guarded turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiOutcome {
    /// A request was executed; the text carries its normalized result
    Executed(String),
    /// The model answered in prose; nothing was executed
    Conversational(String),
}

impl ApiOutcome {
    /// Value of the `openAPIResult` key.
    pub fn into_text(self) -> String {
        match self {
            ApiOutcome::Executed(text) | ApiOutcome::Conversational(text) => text,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiVars<'a> {
    custom_message: &'a str,
    user_context: &'a str,
    schema: &'a str,
    history: &'a str,
    question: &'a str,
}

/// Generates and executes API calls against one described API.
pub struct ApiGuard {
    llm: Arc<dyn LlmClient>,
    model: String,
    config: ApiSourceConfig,
    schema: String,
    command_template: String,
    request_template: String,
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
}

impl ApiGuard {
    /// Build a guard; the schema document is loaded here.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        config: ApiSourceConfig,
    ) -> AppResult<Self> {
        let schema = config.load_schema()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            llm,
            model: model.into(),
            config,
            schema,
            command_template: relay_prompt::templates::API_COMMAND.to_string(),
            request_template: relay_prompt::templates::API_REQUEST.to_string(),
            runner: Arc::new(ProcessRunner),
            http,
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the command-mode and request-mode templates.
    pub fn with_templates(mut self, command: impl Into<String>, request: impl Into<String>) -> Self {
        self.command_template = command.into();
        self.request_template = request.into();
        self
    }

    /// Run one turn.
    pub async fn run(&self, input: &StageInput) -> AppResult<ApiOutcome> {
        let template = match self.config.mode {
            ApiMode::Command => &self.command_template,
            ApiMode::Request => &self.request_template,
        };

        let prompt = render_template(
            template,
            &ApiVars {
                custom_message: self.config.customize_system_message.as_deref().unwrap_or(""),
                user_context: &input.user_context,
                schema: &self.schema,
                history: &input.formatted_history,
                question: &input.question,
            },
        )?;

        let generated = self
            .llm
            .complete(&LlmRequest::new(prompt, &self.model))
            .await?
            .content;

        match self.config.mode {
            ApiMode::Command => match parse_command(&generated) {
                Some(command) => self.run_command(&command).await.map(ApiOutcome::Executed),
                None => Ok(self.conversational(generated)),
            },
            ApiMode::Request => match parse_request(&generated) {
                Some(request) => self.send_request(request).await.map(ApiOutcome::Executed),
                None => Ok(self.conversational(generated)),
            },
        }
    }

    fn conversational(&self, text: String) -> ApiOutcome {
        tracing::debug!("Model output is not a request, returning it unexecuted");
        ApiOutcome::Conversational(text.trim().to_string())
    }

    async fn run_command(&self, command: &str) -> AppResult<String> {
        tracing::debug!(command = %command, "Generated API command");

        let argv = with_headers(command_argv(command)?, &self.config.auth_headers());
        let output = self.runner.run(&argv, self.config.timeout()).await?;

        if !output.success() {
            return Err(AppError::Api(format!(
                "Command exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        Ok(format!("{}{}", SUCCESS_PREFIX, output.stdout.trim()))
    }

    async fn send_request(&self, request: ApiRequest) -> AppResult<String> {
        tracing::debug!(method = %request.method, url = %request.url, "Generated API request");

        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| AppError::Api(format!("Invalid HTTP method: {}", request.method)))?;

        let mut builder = self
            .http
            .request(method.clone(), &request.url)
            .timeout(self.config.timeout())
            .header(reqwest::header::CONTENT_TYPE, &request.content_type);
        for (name, value) in self.config.auth_headers() {
            builder = builder.header(name, value);
        }
        if let Some(data) = request.data.filter(|d| !d.is_null() && method != reqwest::Method::GET) {
            builder = builder.body(serde_json::to_string(&data)?);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::timeout()
            } else {
                AppError::Api(format!("Failed to send request: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "API request failed");
            return Ok(REQUEST_ERROR.to_string());
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::timeout()
            } else {
                AppError::Api(format!("Failed to read response: {}", e))
            }
        })?;

        Ok(format!("{}{}", SUCCESS_PREFIX, body.trim()))
    }
}

impl fmt::Debug for ApiGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiGuard")
            .field("model", &self.model)
            .field("mode", &self.config.mode)
            .finish()
    }
}
