//! Callable tool abstraction.

use relay_core::AppResult;
use relay_llm::ToolSpec;
use serde_json::Value;
use std::sync::Arc;

/// A named action the model can request during the tool-calling loop.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value;

    /// Execute with the model-supplied arguments and return the observation.
    async fn call(&self, args: Value) -> AppResult<String>;
}

/// Tool definition offered to the model.
pub fn tool_spec(tool: &dyn Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.input_schema(),
    }
}

/// One `- **name** → description` line per tool, for system prompts.
pub fn describe_tools(tools: &[Arc<dyn Tool>]) -> String {
    tools
        .iter()
        .map(|t| format!("- **{}** → {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n")
}
