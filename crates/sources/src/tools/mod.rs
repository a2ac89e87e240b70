//! Tool calling: the tool abstraction, the orchestration loop and the two
//! tool families (MCP servers and wrapped agents).

pub mod agent;
pub mod mcp;
pub mod orchestrator;
pub mod tool;

pub use agent::{agent_tool_name, Agent, AgentRequest, AgentTool};
pub use mcp::{qualified_tool_name, McpRegistry, McpTool};
pub use orchestrator::{ToolErrorHandler, ToolOrchestrator, ToolRun, ToolStep};
pub use tool::{describe_tools, tool_spec, Tool};
