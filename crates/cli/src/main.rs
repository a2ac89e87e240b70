//! Relay CLI
//!
//! Main entry point for the relay command-line tool.
//! Answers questions from configured databases, APIs, documents and tools.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{AskCommand, HistoryCommand, IndexCommand, SourcesCommand};
use relay_core::config::AppConfig;
use relay_core::logging::{self, LogFormat};
use std::path::PathBuf;

/// Relay - multi-source question answering
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Answer questions from databases, APIs, documents and tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RELAY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    log_format: LogFormatArg,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider
    #[arg(short, long, global = true, env = "RELAY_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RELAY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask one question
    Ask(AskCommand),

    /// Show active sources and the answer prompt
    Sources(SourcesCommand),

    /// Document index management
    Index(IndexCommand),

    /// Conversation history management
    History(HistoryCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;

    // Re-read the config file that belongs to an overridden location
    if cli.workspace.is_some() || cli.config.is_some() {
        config = config.with_overrides(cli.workspace, cli.config, None, None, None, false, false);
        let path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.relay_dir().join("config.yaml"));
        if path.exists() {
            config = config
                .merge_yaml(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
        }
    }

    let config = config.with_overrides(
        None,
        None,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, cli.log_format.into())?;

    tracing::info!("Relay CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_relay_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Sources(_) => "sources",
        Commands::Index(_) => "index",
        Commands::History(_) => "history",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Sources(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::History(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}
