use super::StageDeps;
use crate::stage::{SourceKind, Stage, StageContext};
use relay_core::sources::ToolSourceConfig;
use relay_core::{AppError, AppResult};
use relay_prompt::render_template;
use relay_sources::tools::describe_tools;
use relay_sources::{AgentTool, McpRegistry, StageInput, Tool, ToolOrchestrator};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsVars<'a> {
    tools: &'a str,
    custom_message: &'a str,
    user_context: &'a str,
    history: &'a str,
}

struct Connected {
    registry: McpRegistry,
    orchestrator: ToolOrchestrator,
    catalog: String,
}

/// Tool-calling loop over MCP tools and wrapped agents.
pub struct ToolsStage {
    config: ToolSourceConfig,
    deps: StageDeps,
    connected: OnceCell<Connected>,
}

impl ToolsStage {
    pub fn new(config: ToolSourceConfig, deps: StageDeps) -> Self {
        Self {
            config,
            deps,
            connected: OnceCell::new(),
        }
    }

    async fn connected(&self) -> AppResult<&Connected> {
        self.connected
            .get_or_try_init(|| async {
                let registry = McpRegistry::connect(&self.config).await?;

                let mut tools: Vec<Arc<dyn Tool>> = registry.tools();
                for agent in &self.deps.agents {
                    tools.push(Arc::new(AgentTool::new(Arc::clone(agent))));
                }
                tracing::info!(tools = tools.len(), "Tool set ready");

                let catalog = describe_tools(&tools);
                let orchestrator =
                    ToolOrchestrator::new(Arc::clone(&self.deps.llm), self.deps.model.clone(), tools)
                        .with_max_iterations(self.config.max_iterations)
                        .with_max_tool_errors(self.config.max_tool_errors)
                        .with_temperature(self.deps.temperature);

                Ok::<_, AppError>(Connected {
                    registry,
                    orchestrator,
                    catalog,
                })
            })
            .await
    }
}

#[async_trait::async_trait]
impl Stage for ToolsStage {
    fn kind(&self) -> SourceKind {
        SourceKind::Tools
    }

    async fn initialize(&self) -> AppResult<()> {
        self.connected().await.map(|_| ())
    }

    async fn run(&self, input: &StageInput) -> AppResult<StageContext> {
        let connected = self.connected().await?;

        let system = render_template(
            &self.deps.prompts.tools,
            &ToolsVars {
                tools: &connected.catalog,
                custom_message: self.config.customize_system_message.as_deref().unwrap_or(""),
                user_context: &input.user_context,
                history: &input.formatted_history,
            },
        )?;

        let run = connected
            .orchestrator
            .run(&system, &input.history, &input.question)
            .await?;
        tracing::debug!(
            steps = run.steps.len(),
            errors = run.error_count(),
            iterations = run.iterations,
            "Tool loop complete"
        );

        Ok(StageContext::tools(run.answer))
    }

    async fn shutdown(&self) {
        if let Some(connected) = self.connected.get() {
            connected.registry.shutdown().await;
        }
    }
}
