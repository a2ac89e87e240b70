//! Per-turn input shared by every stage.

use relay_llm::LlmMessage;
use serde::Serialize;

/// What each active stage receives for one turn.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInput {
    pub question: String,

    /// Bounded history suffix as chat messages
    #[serde(skip)]
    pub history: Vec<LlmMessage>,

    /// The same suffix flattened to `ROLE: text` lines
    pub formatted_history: String,

    /// Free-form caller context, empty when absent
    pub user_context: String,

    pub session_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_thread_id: Option<String>,
}

impl StageInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<LlmMessage>, formatted: impl Into<String>) -> Self {
        self.history = history;
        self.formatted_history = formatted.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.user_context = context.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// `(key)` substitution pairs for filter templates.
    pub fn filter_vars(&self) -> Vec<(&str, &str)> {
        let mut vars = vec![
            ("question", self.question.as_str()),
            ("userSessionId", self.session_id.as_str()),
            ("context", self.user_context.as_str()),
        ];
        if let Some(ref thread) = self.chat_thread_id {
            vars.push(("chatThreadID", thread.as_str()));
        }
        vars
    }
}
