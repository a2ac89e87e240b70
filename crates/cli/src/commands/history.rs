//! History command handler.
//!
//! Inspects the SQLite conversation history of the workspace.

use super::print_json;
use clap::{Args, Subcommand};
use relay_core::{config::AppConfig, AppError, AppResult};
use relay_pipeline::history::role_label;
use relay_pipeline::{ChatHistory, HistoryStore, SqliteHistoryStore};

/// Conversation history management
#[derive(Args, Debug)]
pub struct HistoryCommand {
    #[command(subcommand)]
    pub action: HistoryAction,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List sessions with stored messages
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print every message of a session
    Show {
        #[arg(short, long)]
        session: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every message of a session
    Clear {
        #[arg(short, long)]
        session: String,
    },
}

impl HistoryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store = SqliteHistoryStore::open(&config.history_path(), config.agent.history_limit)?;

        match self.action {
            HistoryAction::List { json } => {
                let sessions = store.sessions().await?;
                if json {
                    let value: Vec<_> = sessions
                        .iter()
                        .map(|(id, count)| serde_json::json!({ "session": id, "messages": count }))
                        .collect();
                    print_json(&serde_json::Value::Array(value))?;
                } else if sessions.is_empty() {
                    println!("No stored sessions");
                } else {
                    for (id, count) in sessions {
                        println!("{}  ({} messages)", id, count);
                    }
                }
            }
            HistoryAction::Show { ref session, json } => {
                let messages = store.history(session).await?.all_messages().await?;
                if json {
                    let value = serde_json::to_value(&messages)
                        .map_err(|e| AppError::Serialization(e.to_string()))?;
                    print_json(&value)?;
                } else {
                    for message in messages {
                        println!("{}: {}", role_label(message.role), message.content);
                    }
                }
            }
            HistoryAction::Clear { ref session } => {
                store.history(session).await?.clear().await?;
                println!("Cleared history of session {}", session);
            }
        }

        Ok(())
    }
}
