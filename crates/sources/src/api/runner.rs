//! Process execution for generated commands.

use relay_core::{AppError, AppResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of one process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes an argv without a shell.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], timeout: Duration) -> AppResult<CommandOutput>;
}

/// Runs commands as child processes.
///
/// The child is killed when the timeout elapses.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> AppResult<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AppError::Api("Empty command".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Api(format!("Failed to start {}: {}", program, e)))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| AppError::Api(format!("Failed to run {}: {}", program, e)))?
            }
            Err(_) => {
                tracing::warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "Command timed out");
                return Err(AppError::timeout());
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
