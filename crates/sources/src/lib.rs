//! Guarded sources for Relay.
//!
//! Each source turns a question into a model-authored action, validates it
//! and executes it safely:
//!
//! - [`sql`]: SQL generation, size probing, execution and summarization
//! - [`api`]: curl command (or JSON request) generation and execution
//! - [`tools`]: the tool-calling loop, MCP tool servers and agents as tools

pub mod api;
pub mod fenced;
pub mod input;
pub mod sql;
pub mod tools;

#[cfg(test)]
mod tests;

pub use api::{ApiGuard, ApiOutcome, CommandRunner, ProcessRunner};
pub use input::StageInput;
pub use sql::{SqlDatabase, SqlGuard, SqlOutcome, SqlRejection, SqliteDatabase};
pub use tools::{
    Agent, AgentRequest, AgentTool, McpRegistry, Tool, ToolOrchestrator, ToolRun, ToolStep,
};
