//! Multi-source answer pipeline for Relay.
//!
//! - [`StageRegistry`] decides from configuration which sources are active
//! - [`PipelineAssembler`] fans a turn out to every active stage and feeds
//!   the merged [`StageContext`] into one answer-generation call
//! - [`SessionPipeline`] adds session history, streaming and turn events
//!
//! # Example
//! ```no_run
//! use relay_llm::OllamaClient;
//! use relay_pipeline::{SessionPipeline, TurnInput};
//! use std::sync::Arc;
//!
//! # async fn example() -> relay_core::AppResult<()> {
//! let pipeline = SessionPipeline::builder(Arc::new(OllamaClient::new()), "llama3.2").build()?;
//! let output = pipeline.invoke(TurnInput::new("What is 2+2?")).await?;
//! println!("{}", output.answer);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod history;
pub mod monitor;
pub mod registry;
pub mod session;
pub mod stage;
pub mod stages;

#[cfg(test)]
mod tests;

pub use assembler::{ComposedPipeline, PipelineAssembler, PipelineOutput};
pub use history::{ChatHistory, HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
pub use monitor::{monitor_from_config, HttpMonitor, Monitor, RunRecord, TracingMonitor};
pub use registry::{StageFactory, StageRegistry};
pub use session::{SessionPipeline, SessionPipelineBuilder, TurnEvent, TurnInput, TurnOutput};
pub use stage::{SourceKind, Stage, StageContext};
pub use stages::StageDeps;
