//! Prompt system for Relay.
//!
//! - Built-in templates for every model call a pipeline makes
//! - Handlebars rendering
//! - Workspace overrides from `.relay/prompts/`
//! - The composer that assembles the final system prompt from one fragment
//!   per active source

pub mod builder;
pub mod loader;
pub mod templates;
pub mod types;

pub use builder::{check_template, placeholders, render_template, PromptComposer};
pub use loader::{list_prompt_files, load_prompt_set};
pub use types::{PromptId, PromptSet};
