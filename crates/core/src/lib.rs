//! Relay Core Library
//!
//! Foundational pieces shared by every Relay crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management and source descriptors

pub mod config;
pub mod error;
pub mod logging;
pub mod sources;

pub use config::{AgentSettings, AppConfig};
pub use error::{AppError, AppResult};
pub use sources::SourceConfig;
