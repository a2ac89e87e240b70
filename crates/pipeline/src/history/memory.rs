//! In-process history store.

use super::{last_messages, ChatHistory, HistoryStore};
use relay_core::AppResult;
use relay_llm::LlmMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Keeps every session in memory for the life of the process.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    limit: usize,
    sessions: Mutex<HashMap<String, Arc<MemoryHistory>>>,
}

impl MemoryHistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn history(&self, session_id: &str) -> AppResult<Arc<dyn ChatHistory>> {
        let mut sessions = self.sessions.lock().await;
        let history = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = session_id, "Created session history");
                Arc::new(MemoryHistory {
                    limit: self.limit,
                    messages: Mutex::new(Vec::new()),
                })
            });
        Ok(Arc::clone(history) as Arc<dyn ChatHistory>)
    }
}

#[derive(Debug)]
struct MemoryHistory {
    limit: usize,
    messages: Mutex<Vec<LlmMessage>>,
}

#[async_trait::async_trait]
impl ChatHistory for MemoryHistory {
    async fn add_user_message(&self, text: &str) -> AppResult<()> {
        self.messages.lock().await.push(LlmMessage::user(text));
        Ok(())
    }

    async fn add_ai_message(&self, text: &str) -> AppResult<()> {
        self.messages.lock().await.push(LlmMessage::assistant(text));
        Ok(())
    }

    async fn get_messages(&self) -> AppResult<Vec<LlmMessage>> {
        Ok(last_messages(&self.messages.lock().await, self.limit))
    }

    async fn all_messages(&self) -> AppResult<Vec<LlmMessage>> {
        Ok(self.messages.lock().await.clone())
    }

    async fn clear(&self) -> AppResult<()> {
        self.messages.lock().await.clear();
        Ok(())
    }
}
