//! Tool-calling loop.
//!
//! The model either answers or requests tool calls; requested calls run
//! concurrently and their observations are fed back until the model answers
//! without tools or a budget runs out. A failing tool never aborts the loop:
//! its error becomes that call's observation.

use super::tool::{tool_spec, Tool};
use futures::future::join_all;
use relay_core::{AppError, AppResult};
use relay_llm::{LlmClient, LlmMessage, LlmRequest, ToolCall};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turns a tool failure into the observation shown to the model.
pub type ToolErrorHandler = Arc<dyn Fn(&str, &AppError) -> String + Send + Sync>;

const BUDGET_EXHAUSTED: &str =
    "Tool budget exhausted. Answer now using only the observations gathered so far.";

/// One executed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStep {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub observation: String,
    pub is_error: bool,
}

/// Result of one loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub answer: String,
    pub steps: Vec<ToolStep>,
    pub iterations: usize,
    /// True when a budget ended the loop before the model finished
    pub budget_exhausted: bool,
}

impl ToolRun {
    pub fn error_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_error).count()
    }
}

/// Runs the reason / call / observe loop over a fixed tool set.
pub struct ToolOrchestrator {
    llm: Arc<dyn LlmClient>,
    model: String,
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
    max_iterations: usize,
    max_tool_errors: usize,
    error_handler: Option<ToolErrorHandler>,
    temperature: Option<f32>,
}

impl ToolOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        let order = tools.iter().map(|t| t.name().to_string()).collect();
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();

        Self {
            llm,
            model: model.into(),
            tools,
            order,
            max_iterations: 10,
            max_tool_errors: 3,
            error_handler: None,
            temperature: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_max_tool_errors(mut self, max_tool_errors: usize) -> Self {
        self.max_tool_errors = max_tool_errors;
        self
    }

    /// Customize how tool failures are reported to the model.
    pub fn with_error_handler(mut self, handler: ToolErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Tools in registration order.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    /// Run the loop for one question.
    pub async fn run(
        &self,
        system_prompt: &str,
        history: &[LlmMessage],
        question: &str,
    ) -> AppResult<ToolRun> {
        let specs: Vec<_> = self.tools().iter().map(|t| tool_spec(t.as_ref())).collect();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(LlmMessage::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(LlmMessage::user(question));

        let mut steps: Vec<ToolStep> = Vec::new();
        let mut errors = 0usize;

        for iteration in 1..=self.max_iterations {
            let request = LlmRequest::from_messages(messages.clone(), &self.model)
                .with_tools(specs.clone())
                .with_sampling(self.temperature, None);
            let response = self.llm.complete(&request).await?;

            if response.tool_calls.is_empty() {
                tracing::debug!(iteration, steps = steps.len(), "Tool loop finished");
                return Ok(ToolRun {
                    answer: response.content,
                    steps,
                    iterations: iteration,
                    budget_exhausted: false,
                });
            }

            messages.push(LlmMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            let results = join_all(response.tool_calls.iter().map(|call| self.execute(call))).await;
            for (call, step) in response.tool_calls.iter().zip(results) {
                if step.is_error {
                    errors += 1;
                }
                messages.push(LlmMessage::tool(call, step.observation.clone()));
                steps.push(step);
            }

            if self.max_tool_errors > 0 && errors >= self.max_tool_errors {
                tracing::warn!(errors, "Tool error budget exhausted");
                return self.finish(messages, steps, iteration).await;
            }
        }

        tracing::warn!(max = self.max_iterations, "Tool iteration budget exhausted");
        self.finish(messages, steps, self.max_iterations).await
    }

    /// Final answer without tools once a budget is spent.
    async fn finish(
        &self,
        mut messages: Vec<LlmMessage>,
        steps: Vec<ToolStep>,
        iterations: usize,
    ) -> AppResult<ToolRun> {
        messages.push(LlmMessage::user(BUDGET_EXHAUSTED));
        let request = LlmRequest::from_messages(messages, &self.model)
            .with_sampling(self.temperature, None);
        let response = self.llm.complete(&request).await?;

        Ok(ToolRun {
            answer: response.content,
            steps,
            iterations,
            budget_exhausted: true,
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolStep {
        let result = match self.tools.get(&call.name) {
            Some(tool) => {
                tracing::debug!(tool = %call.name, "Calling tool");
                tool.call(call.arguments.clone()).await
            }
            None => Err(AppError::Tool(format!(
                "Tool '{}' is not available. Available tools: {}",
                call.name,
                self.order.join(", ")
            ))),
        };

        match result {
            Ok(observation) => ToolStep {
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
                observation,
                is_error: false,
            },
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                let observation = match self.error_handler {
                    Some(ref handler) => handler(&call.name, &e),
                    None => format!("Error: {}", e),
                };
                ToolStep {
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    observation,
                    is_error: true,
                }
            }
        }
    }
}

impl fmt::Debug for ToolOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolOrchestrator")
            .field("model", &self.model)
            .field("tools", &self.order)
            .field("max_iterations", &self.max_iterations)
            .field("max_tool_errors", &self.max_tool_errors)
            .finish()
    }
}
