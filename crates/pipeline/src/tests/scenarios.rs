//! End-to-end turns through the session pipeline.

use super::{collect_events, final_message};
use crate::session::{SessionPipeline, TurnEvent, TurnInput};
use crate::stage::SourceKind;
use relay_core::sources::{ApiSourceConfig, DatabaseSourceConfig, SourceConfig};
use relay_core::{AppError, AppResult};
use relay_llm::{LlmClient, LlmResponse, Role, ScriptedClient, ToolCall};
use relay_sources::api::{CommandOutput, CommandRunner};
use relay_sources::{Agent, AgentRequest};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn scripted(texts: &[&str]) -> Arc<ScriptedClient> {
    Arc::new(ScriptedClient::from_texts(texts))
}

fn builder(llm: &Arc<ScriptedClient>) -> crate::session::SessionPipelineBuilder {
    SessionPipeline::builder(Arc::clone(llm) as Arc<dyn LlmClient>, "test-model")
}

#[tokio::test]
async fn test_scenario_a_no_sources() {
    let llm = scripted(&["4"]);
    let pipeline = builder(&llm).build().unwrap();
    assert!(pipeline.kinds().is_empty());

    let (tx, rx) = mpsc::channel(16);
    pipeline.call(TurnInput::new("What is 2+2?"), tx).await;
    let events = collect_events(rx).await;

    assert_eq!(events.len(), 2);
    assert_eq!(final_message(&events), "4");

    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    let system = &requests[0].messages[0];
    assert_eq!(system.role, Role::System);
    assert!(!system.content.contains("----"));
    assert_eq!(requests[0].last_user_content(), Some("What is 2+2?"));
}

#[tokio::test]
async fn test_scenario_b_sql_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.sqlite");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL NOT NULL);
             INSERT INTO orders (total) VALUES (10.0), (20.0), (30.0);",
        )
        .unwrap();
    }

    let llm = scripted(&[
        "SELECT COUNT(*) FROM orders;",
        "There are 3 orders.",
        "You have 3 orders.",
    ]);
    let pipeline = builder(&llm)
        .with_sources(SourceConfig {
            database: Some(DatabaseSourceConfig::sqlite(path.to_string_lossy())),
            ..SourceConfig::default()
        })
        .build()
        .unwrap();

    let output = pipeline
        .invoke(TurnInput::new("how many orders are there").with_session("b"))
        .await
        .unwrap();

    assert_eq!(output.answer, "You have 3 orders.");
    assert_eq!(output.session_id, "b");
    assert_eq!(output.context.sql_result.as_deref(), Some("There are 3 orders."));
    assert!(output
        .context
        .sql_query
        .as_deref()
        .unwrap()
        .to_lowercase()
        .starts_with("select count(*) from orders"));

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    let system = &requests[2].messages[0].content;
    assert!(system.contains("There are 3 orders."));
    assert!(system.contains("SELECT COUNT(*) FROM orders;"));
}

/// Records argv instead of spawning a process.
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait::async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, argv: &[String], _timeout: Duration) -> AppResult<CommandOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        Ok(CommandOutput {
            exit_code: 0,
            stdout: "{\"status\":\"shipped\"}".to_string(),
            stderr: String::new(),
        })
    }
}

#[tokio::test]
async fn test_scenario_c_api_prose_is_not_executed() {
    let prose = "Which order id should I look up?";
    let llm = scripted(&[prose, "Please tell me the order id."]);
    let runner = Arc::new(RecordingRunner::default());
    let pipeline = builder(&llm)
        .with_sources(SourceConfig {
            api: Some(ApiSourceConfig::with_schema(
                "openapi: 3.0.0\npaths:\n  /orders/{id}:\n    get: {}\n",
            )),
            ..SourceConfig::default()
        })
        .with_command_runner(runner.clone())
        .build()
        .unwrap();
    assert_eq!(pipeline.kinds(), vec![SourceKind::Api]);

    let output = pipeline
        .invoke(TurnInput::new("where is my order?"))
        .await
        .unwrap();

    assert!(runner.calls.lock().unwrap().is_empty());
    assert_eq!(output.context.open_api_result.as_deref(), Some(prose));
    assert_eq!(output.answer, "Please tell me the order id.");
}

#[tokio::test]
async fn test_scenario_c_api_command_is_executed() {
    let llm = scripted(&[
        "curl -s https://shop.example.com/orders/42",
        "Order 42 has shipped.",
    ]);
    let runner = Arc::new(RecordingRunner::default());
    let pipeline = builder(&llm)
        .with_sources(SourceConfig {
            api: Some(ApiSourceConfig::with_schema("openapi: 3.0.0")),
            ..SourceConfig::default()
        })
        .with_command_runner(runner.clone())
        .build()
        .unwrap();

    let output = pipeline
        .invoke(TurnInput::new("status of order 42?"))
        .await
        .unwrap();

    assert_eq!(runner.calls.lock().unwrap().len(), 1);
    assert!(output
        .context
        .open_api_result
        .as_deref()
        .unwrap()
        .contains("shipped"));
}

struct InventoryAgent;

#[async_trait::async_trait]
impl Agent for InventoryAgent {
    fn name(&self) -> &str {
        "Inventory"
    }

    fn description(&self) -> &str {
        "Stock levels per product"
    }

    async fn ask(&self, _request: AgentRequest) -> AppResult<String> {
        Err(AppError::Tool("inventory backend unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_scenario_d_tool_failure_is_an_observation() {
    let llm = Arc::new(ScriptedClient::new(vec![
        LlmResponse::with_tool_calls(vec![ToolCall::new(
            "call-1",
            "inventory_tool",
            json!({"question": "How many widgets are in stock?"}),
        )]),
        LlmResponse::text("The inventory service is unreachable right now."),
        LlmResponse::text("Sorry, I could not check the inventory."),
    ]));
    let pipeline = builder(&llm)
        .with_agent(Arc::new(InventoryAgent))
        .build()
        .unwrap();
    assert_eq!(pipeline.kinds(), vec![SourceKind::Tools]);

    let (tx, rx) = mpsc::channel(16);
    pipeline
        .call(TurnInput::new("How many widgets are in stock?"), tx)
        .await;
    let events = collect_events(rx).await;

    assert!(!events.iter().any(|e| matches!(e, TurnEvent::Error(_))));
    assert_eq!(final_message(&events), "Sorry, I could not check the inventory.");

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    let observation = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(observation.content.starts_with("Error: "));
    assert!(observation.content.contains("inventory backend unreachable"));

    let answer_system = &requests[2].messages[0].content;
    assert!(answer_system.contains("The inventory service is unreachable right now."));
}
