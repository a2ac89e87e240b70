use crate::tools::{describe_tools, Tool, ToolOrchestrator};
use relay_core::{AppError, AppResult};
use relay_llm::{LlmResponse, Role, ScriptedClient, ToolCall};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct WeatherTool;

#[async_trait::async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Current weather for a city"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"city": {"type": "string"}}})
    }

    async fn call(&self, args: Value) -> AppResult<String> {
        let city = args["city"].as_str().unwrap_or("nowhere");
        Ok(format!("Sunny in {}", city))
    }
}

struct BrokenTool {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "inventory"
    }

    fn description(&self) -> &str {
        "Stock levels"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn call(&self, _args: Value) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Tool("inventory backend unreachable".to_string()))
    }
}

fn call(id: &str, name: &str, args: Value) -> LlmResponse {
    LlmResponse::with_tool_calls(vec![ToolCall::new(id, name, args)])
}

#[tokio::test]
async fn test_single_tool_round_trip() {
    let llm = Arc::new(ScriptedClient::new(vec![
        call("c1", "weather", json!({"city": "Lisbon"})),
        LlmResponse::text("It is sunny in Lisbon."),
    ]));
    let orchestrator = ToolOrchestrator::new(llm.clone(), "m", vec![Arc::new(WeatherTool)]);

    let run = orchestrator.run("You are helpful.", &[], "Weather in Lisbon?").await.unwrap();

    assert_eq!(run.answer, "It is sunny in Lisbon.");
    assert_eq!(run.iterations, 2);
    assert_eq!(run.steps.len(), 1);
    assert_eq!(run.steps[0].observation, "Sunny in Lisbon");
    assert!(!run.budget_exhausted);

    let requests = llm.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "weather");

    let second = &requests[1].messages;
    assert_eq!(second[0].role, Role::System);
    assert_eq!(second[2].role, Role::Assistant);
    assert_eq!(second[2].tool_calls.len(), 1);
    assert_eq!(second[3].role, Role::Tool);
    assert_eq!(second[3].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(second[3].content, "Sunny in Lisbon");
}

#[tokio::test]
async fn test_scenario_d_failing_tool_does_not_abort() {
    let tool = Arc::new(BrokenTool {
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(ScriptedClient::from_fn(|request| {
        let failed = request
            .messages
            .iter()
            .any(|m| m.role == Role::Tool && m.content.starts_with("Error:"));
        if failed {
            Ok(LlmResponse::text(
                "I could not check stock because the inventory tool failed.",
            ))
        } else {
            Ok(call("c1", "inventory", json!({"sku": "A1"})))
        }
    }));
    let orchestrator = ToolOrchestrator::new(llm, "m", vec![tool.clone() as Arc<dyn Tool>]);

    let run = orchestrator.run("sys", &[], "Is A1 in stock?").await.unwrap();

    assert!(run.answer.contains("inventory tool failed"));
    assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.error_count(), 1);
    assert_eq!(
        run.steps[0].observation,
        "Error: Tool error: inventory backend unreachable"
    );
}

#[tokio::test]
async fn test_unknown_tool_becomes_observation() {
    let llm = Arc::new(ScriptedClient::new(vec![
        call("c1", "teleport", json!({})),
        LlmResponse::text("That tool does not exist."),
    ]));
    let orchestrator = ToolOrchestrator::new(llm, "m", vec![Arc::new(WeatherTool)]);

    let run = orchestrator.run("sys", &[], "q").await.unwrap();
    assert!(run.steps[0].is_error);
    assert!(run.steps[0].observation.contains("'teleport' is not available"));
    assert!(run.steps[0].observation.contains("weather"));
}

#[tokio::test]
async fn test_parallel_calls_keep_order() {
    let llm = Arc::new(ScriptedClient::new(vec![
        LlmResponse::with_tool_calls(vec![
            ToolCall::new("a", "weather", json!({"city": "Oslo"})),
            ToolCall::new("b", "weather", json!({"city": "Rome"})),
        ]),
        LlmResponse::text("Both sunny."),
    ]));
    let orchestrator = ToolOrchestrator::new(llm, "m", vec![Arc::new(WeatherTool)]);

    let run = orchestrator.run("sys", &[], "q").await.unwrap();
    let observations: Vec<_> = run.steps.iter().map(|s| s.observation.as_str()).collect();
    assert_eq!(observations, vec!["Sunny in Oslo", "Sunny in Rome"]);
}

#[tokio::test]
async fn test_iteration_budget_forces_final_answer() {
    let llm = Arc::new(ScriptedClient::from_fn(|request| {
        if request.tools.is_empty() {
            Ok(LlmResponse::text("Final without tools."))
        } else {
            Ok(call("c", "weather", json!({"city": "Paris"})))
        }
    }));
    let orchestrator =
        ToolOrchestrator::new(llm.clone(), "m", vec![Arc::new(WeatherTool)]).with_max_iterations(2);

    let run = orchestrator.run("sys", &[], "q").await.unwrap();

    assert_eq!(run.answer, "Final without tools.");
    assert!(run.budget_exhausted);
    assert_eq!(run.steps.len(), 2);
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn test_error_budget_stops_loop() {
    let tool = Arc::new(BrokenTool {
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(ScriptedClient::from_fn(|request| {
        if request.tools.is_empty() {
            Ok(LlmResponse::text("Giving up."))
        } else {
            Ok(call("c", "inventory", json!({})))
        }
    }));
    let orchestrator = ToolOrchestrator::new(llm, "m", vec![tool.clone() as Arc<dyn Tool>])
        .with_max_tool_errors(2);

    let run = orchestrator.run("sys", &[], "q").await.unwrap();
    assert_eq!(run.answer, "Giving up.");
    assert!(run.budget_exhausted);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_custom_error_handler() {
    let llm = Arc::new(ScriptedClient::new(vec![
        call("c", "inventory", json!({})),
        LlmResponse::text("done"),
    ]));
    let tool = Arc::new(BrokenTool {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = ToolOrchestrator::new(llm, "m", vec![tool as Arc<dyn Tool>])
        .with_error_handler(Arc::new(|name: &str, _: &AppError| {
            format!("{} is offline", name)
        }));

    let run = orchestrator.run("sys", &[], "q").await.unwrap();
    assert_eq!(run.steps[0].observation, "inventory is offline");
}

#[test]
fn test_describe_tools() {
    let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(WeatherTool)];
    assert_eq!(describe_tools(&tools), "- **weather** → Current weather for a city");
}
