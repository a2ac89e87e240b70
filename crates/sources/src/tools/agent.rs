//! Agents exposed as tools.
//!
//! A supervisor pipeline can call other agents through the tool loop; each
//! agent is wrapped with a generated tool name and a fixed argument schema.

use super::tool::Tool;
use relay_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// A question addressed to an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub question: String,

    #[serde(default, rename = "chatThreadID", skip_serializing_if = "Option::is_none")]
    pub chat_thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AgentRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

/// Something that answers questions.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Answer one question and return the final text.
    async fn ask(&self, request: AgentRequest) -> AppResult<String>;
}

/// Tool name for an agent display name: `"Sales (EU)"` becomes `sales__eu__tool`.
pub fn agent_tool_name(display_name: &str) -> String {
    let base: String = display_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '(' | ')' => '_',
            c => c,
        })
        .collect();
    format!("{}_tool", base)
}

/// Wraps an [`Agent`] as a [`Tool`].
pub struct AgentTool {
    agent: Arc<dyn Agent>,
    name: String,
    description: String,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        let name = agent_tool_name(agent.name());
        let description = agent.description().to_string();
        Self {
            agent,
            name,
            description,
        }
    }
}

#[async_trait::async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the agent"
                },
                "chatThreadID": { "type": "string" },
                "userSessionId": { "type": "string" },
                "context": { "type": "string" }
            },
            "required": ["question"]
        })
    }

    async fn call(&self, args: Value) -> AppResult<String> {
        let request: AgentRequest = serde_json::from_value(args)
            .map_err(|e| AppError::Tool(format!("Invalid arguments for {}: {}", self.name, e)))?;
        if request.question.trim().is_empty() {
            return Err(AppError::Tool(format!("{} requires a question", self.name)));
        }

        tracing::debug!(agent = %self.agent.name(), "Delegating question to agent");
        self.agent.ask(request).await
    }
}

impl fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTool").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoAgent {
        seen: Mutex<Vec<AgentRequest>>,
    }

    #[async_trait::async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            "Order Desk"
        }

        fn description(&self) -> &str {
            "Answers questions about orders"
        }

        async fn ask(&self, request: AgentRequest) -> AppResult<String> {
            let answer = format!("echo: {}", request.question);
            self.seen.lock().unwrap().push(request);
            Ok(answer)
        }
    }

    #[test]
    fn test_agent_tool_name() {
        assert_eq!(agent_tool_name("Order Desk"), "order_desk_tool");
        assert_eq!(agent_tool_name("Sales (EU)"), "sales__eu__tool");
        assert_eq!(agent_tool_name("risk-bot"), "risk_bot_tool");
    }

    #[tokio::test]
    async fn test_agent_tool_call() {
        let agent = Arc::new(EchoAgent {
            seen: Mutex::new(Vec::new()),
        });
        let tool = AgentTool::new(agent.clone());
        assert_eq!(tool.name(), "order_desk_tool");
        assert_eq!(tool.input_schema()["required"], json!(["question"]));

        let answer = tool
            .call(json!({"question": "status of 7?", "chatThreadID": "t-1"}))
            .await
            .unwrap();
        assert_eq!(answer, "echo: status of 7?");

        let seen = agent.seen.lock().unwrap();
        assert_eq!(seen[0].chat_thread_id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_agent_tool_requires_question() {
        let tool = AgentTool::new(Arc::new(EchoAgent {
            seen: Mutex::new(Vec::new()),
        }));
        assert!(tool.call(json!({"context": "x"})).await.is_err());
        assert!(tool.call(json!({"question": "  "})).await.is_err());
    }
}
