//! Prompt identifiers and the set of templates a pipeline renders.

use serde::{Deserialize, Serialize};

use crate::templates;

/// Identifier of an overridable template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptId {
    Answer,
    SqlQuery,
    SqlSummary,
    ApiCommand,
    ApiRequest,
    Tools,
}

impl PromptId {
    pub const ALL: [PromptId; 6] = [
        PromptId::Answer,
        PromptId::SqlQuery,
        PromptId::SqlSummary,
        PromptId::ApiCommand,
        PromptId::ApiRequest,
        PromptId::Tools,
    ];

    /// File stem used for overrides (e.g. `sql-query.hbs`).
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptId::Answer => "answer",
            PromptId::SqlQuery => "sql-query",
            PromptId::SqlSummary => "sql-summary",
            PromptId::ApiCommand => "api-command",
            PromptId::ApiRequest => "api-request",
            PromptId::Tools => "tools",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == s)
    }

    fn default_template(&self) -> &'static str {
        match self {
            PromptId::Answer => templates::ANSWER_BASE,
            PromptId::SqlQuery => templates::SQL_QUERY,
            PromptId::SqlSummary => templates::SQL_SUMMARY,
            PromptId::ApiCommand => templates::API_COMMAND,
            PromptId::ApiRequest => templates::API_REQUEST,
            PromptId::Tools => templates::TOOLS_SYSTEM,
        }
    }
}

/// Templates used by one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSet {
    pub answer: String,
    pub sql_query: String,
    pub sql_summary: String,
    pub api_command: String,
    pub api_request: String,
    pub tools: String,

    /// Templates replaced from the workspace
    #[serde(default)]
    pub overridden: Vec<PromptId>,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            answer: PromptId::Answer.default_template().to_string(),
            sql_query: PromptId::SqlQuery.default_template().to_string(),
            sql_summary: PromptId::SqlSummary.default_template().to_string(),
            api_command: PromptId::ApiCommand.default_template().to_string(),
            api_request: PromptId::ApiRequest.default_template().to_string(),
            tools: PromptId::Tools.default_template().to_string(),
            overridden: Vec::new(),
        }
    }
}

impl PromptSet {
    pub fn get(&self, id: PromptId) -> &str {
        match id {
            PromptId::Answer => &self.answer,
            PromptId::SqlQuery => &self.sql_query,
            PromptId::SqlSummary => &self.sql_summary,
            PromptId::ApiCommand => &self.api_command,
            PromptId::ApiRequest => &self.api_request,
            PromptId::Tools => &self.tools,
        }
    }

    /// Replace one template.
    pub fn set(&mut self, id: PromptId, template: impl Into<String>) {
        let template = template.into();
        match id {
            PromptId::Answer => self.answer = template,
            PromptId::SqlQuery => self.sql_query = template,
            PromptId::SqlSummary => self.sql_summary = template,
            PromptId::ApiCommand => self.api_command = template,
            PromptId::ApiRequest => self.api_request = template,
            PromptId::Tools => self.tools = template,
        }
        if !self.overridden.contains(&id) {
            self.overridden.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_id_round_trip_names() {
        assert_eq!(PromptId::parse("sql-query"), Some(PromptId::SqlQuery));
        assert_eq!(PromptId::parse("tools"), Some(PromptId::Tools));
        assert_eq!(PromptId::parse("unknown"), None);
    }

    #[test]
    fn test_set_marks_override() {
        let mut set = PromptSet::default();
        assert!(set.get(PromptId::SqlQuery).contains("SQL QUERY:"));

        set.set(PromptId::SqlQuery, "custom {{question}}");
        set.set(PromptId::SqlQuery, "custom again {{question}}");
        assert_eq!(set.get(PromptId::SqlQuery), "custom again {{question}}");
        assert_eq!(set.overridden, vec![PromptId::SqlQuery]);
    }
}
