//! External API source: guarded command or request execution.

pub mod guard;
pub mod parser;
pub mod runner;

pub use guard::{ApiGuard, ApiOutcome, REQUEST_ERROR, SUCCESS_PREFIX};
pub use parser::{parse_command, parse_request, ApiRequest};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
