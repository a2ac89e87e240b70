//! Session-scoped conversational history.
//!
//! A [`HistoryStore`] resolves a session id to a [`ChatHistory`] handle.
//! Handles read a bounded suffix of the conversation for prompt injection
//! and append one human/AI pair per completed turn.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

use relay_core::AppResult;
use relay_llm::{LlmMessage, Role};
use std::sync::Arc;

/// Number of messages read per turn when nothing else is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// The conversation of one session.
#[async_trait::async_trait]
pub trait ChatHistory: Send + Sync {
    async fn add_user_message(&self, text: &str) -> AppResult<()>;

    async fn add_ai_message(&self, text: &str) -> AppResult<()>;

    /// The most recent messages up to the store's limit, oldest first.
    async fn get_messages(&self) -> AppResult<Vec<LlmMessage>>;

    /// Every stored message, oldest first.
    async fn all_messages(&self) -> AppResult<Vec<LlmMessage>>;

    /// [`get_messages`](Self::get_messages) flattened to `ROLE: text` lines.
    async fn formatted_messages(&self) -> AppResult<String> {
        Ok(format_messages(&self.get_messages().await?))
    }

    async fn clear(&self) -> AppResult<()>;
}

/// Resolves session ids to history handles, creating them on first use.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn history(&self, session_id: &str) -> AppResult<Arc<dyn ChatHistory>>;
}

/// Prompt label of a message author.
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "HUMAN",
        Role::Assistant => "AI",
        Role::System => "SYSTEM",
        Role::Tool => "TOOL",
    }
}

/// Flatten messages to newline-joined `ROLE: text` lines.
pub fn format_messages(messages: &[LlmMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", role_label(m.role), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bounded suffix of `messages`.
pub(crate) fn last_messages(messages: &[LlmMessage], limit: usize) -> Vec<LlmMessage> {
    let start = messages.len().saturating_sub(limit);
    messages[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_messages() {
        let messages = vec![
            LlmMessage::user("How many orders?"),
            LlmMessage::assistant("There are 3 orders."),
        ];
        assert_eq!(
            format_messages(&messages),
            "HUMAN: How many orders?\nAI: There are 3 orders."
        );
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(format_messages(&[]), "");
    }

    #[test]
    fn test_last_messages() {
        let messages: Vec<_> = (0..4).map(|i| LlmMessage::user(i.to_string())).collect();
        let tail = last_messages(&messages, 3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].content, "1");
        assert!(last_messages(&messages, 0).is_empty());
        assert_eq!(last_messages(&messages, 10).len(), 4);
    }
}
