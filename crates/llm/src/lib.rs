//! LLM integration crate for Relay.
//!
//! A provider-agnostic chat interface with tool calling and streaming.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Scripted**: Deterministic replies for offline runs and tests
//!
//! # Example
//! ```no_run
//! use relay_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, ScriptedClient};
pub use types::{LlmMessage, Role, ToolCall, ToolSpec};
