//! SQL execution guard.
//!
//! One turn moves through query generation, validation, a row-count probe,
//! execution and summarization. The guard never executes output that does
//! not parse as SQL, and never executes a statement whose probe is empty,
//! too big or fails.

use super::database::SqlDatabase;
use super::parser::{parse_sql, probe_count, probe_statement, SQL_STOP};
use crate::input::StageInput;
use relay_core::sources::DatabaseSourceConfig;
use relay_core::{AppError, AppResult};
use relay_llm::{LlmClient, LlmRequest};
use relay_prompt::render_template;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Why a generated statement was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlRejection {
    /// The probe counted zero rows
    Empty,
    /// The probe counted at least the configured maximum
    TooBig,
    /// The probe itself failed or returned no count
    ProbeFailed,
}

impl SqlRejection {
    pub fn message(&self) -> &'static str {
        match self {
            SqlRejection::Empty => "Data result is empty.",
            SqlRejection::TooBig => "Data result is too big. Please, be more specific.",
            SqlRejection::ProbeFailed => "Data result is error. Please, try again.",
        }
    }

    /// Classify a probe count against the row threshold.
    pub fn classify(count: u64, max_rows: u64) -> Option<Self> {
        if count == 0 {
            Some(SqlRejection::Empty)
        } else if count >= max_rows {
            Some(SqlRejection::TooBig)
        } else {
            None
        }
    }
}

impl fmt::Display for SqlRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Terminal state of one guarded turn.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutcome {
    /// The statement ran and its rows were summarized
    Answered { query: String, answer: String },
    /// The model did not write SQL; its text is passed through unexecuted
    Conversational(String),
    /// The probe rejected the statement
    Rejected { query: String, reason: SqlRejection },
}

impl SqlOutcome {
    /// Value of the `sqlResult` key.
    pub fn sql_result(&self) -> String {
        match self {
            SqlOutcome::Answered { answer, .. } => answer.clone(),
            SqlOutcome::Conversational(text) => text.clone(),
            SqlOutcome::Rejected { reason, .. } => reason.message().to_string(),
        }
    }

    /// Value of the `sqlQuery` key; empty when nothing was generated.
    pub fn sql_query(&self) -> String {
        match self {
            SqlOutcome::Answered { query, .. } | SqlOutcome::Rejected { query, .. } => query.clone(),
            SqlOutcome::Conversational(_) => String::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryVars<'a> {
    custom_message: &'a str,
    user_context: &'a str,
    history: &'a str,
    schema: &'a str,
    question: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryVars<'a> {
    custom_message: &'a str,
    schema: &'a str,
    question: &'a str,
    query: &'a str,
    response: &'a str,
}

/// Generates, validates, executes and summarizes SQL for one database.
pub struct SqlGuard {
    llm: Arc<dyn LlmClient>,
    model: String,
    database: Arc<dyn SqlDatabase>,
    config: DatabaseSourceConfig,
    query_template: String,
    summary_template: String,
    schema: OnceCell<String>,
}

impl SqlGuard {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        database: Arc<dyn SqlDatabase>,
        config: DatabaseSourceConfig,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            database,
            config,
            query_template: relay_prompt::templates::SQL_QUERY.to_string(),
            summary_template: relay_prompt::templates::SQL_SUMMARY.to_string(),
            schema: OnceCell::new(),
        }
    }

    /// Replace the query-generation and summary templates.
    pub fn with_templates(mut self, query: impl Into<String>, summary: impl Into<String>) -> Self {
        self.query_template = query.into();
        self.summary_template = summary.into();
        self
    }

    /// Schema description, fetched on first use and cached.
    pub async fn schema(&self) -> AppResult<&str> {
        self.schema
            .get_or_try_init(|| async {
                let info = self
                    .database
                    .table_info(&self.config.include_tables, &self.config.ignore_tables)
                    .await?;
                tracing::debug!(dialect = self.database.dialect(), "Loaded table info");
                Ok::<_, AppError>(info)
            })
            .await
            .map(String::as_str)
    }

    /// Run one turn.
    pub async fn run(&self, input: &StageInput) -> AppResult<SqlOutcome> {
        let schema = self.schema().await?;
        let custom_message = self.config.customize_system_message.as_deref().unwrap_or("");

        let prompt = render_template(
            &self.query_template,
            &QueryVars {
                custom_message,
                user_context: &input.user_context,
                history: &input.formatted_history,
                schema,
                question: &input.question,
            },
        )?;

        let response = self
            .llm
            .complete(&LlmRequest::new(prompt, &self.model).with_stop(SQL_STOP))
            .await?;
        let generated = response.content;

        let Some(query) = parse_sql(&generated) else {
            tracing::debug!("Model output is not SQL, returning it unexecuted");
            return Ok(SqlOutcome::Conversational(generated.trim().to_string()));
        };
        tracing::debug!(sql = %query, "Generated SQL");

        if self.config.probe {
            if let Some(reason) = self.probe(&query).await {
                tracing::warn!(sql = %query, reason = %reason, "SQL rejected by probe");
                return Ok(SqlOutcome::Rejected { query, reason });
            }
        }

        let rows = self.database.run(&query).await?;

        let prompt = render_template(
            &self.summary_template,
            &SummaryVars {
                custom_message,
                schema,
                question: &input.question,
                query: &query,
                response: &rows,
            },
        )?;
        let summary = self
            .llm
            .complete(&LlmRequest::new(prompt, &self.model))
            .await?;

        Ok(SqlOutcome::Answered {
            query,
            answer: summary.content.trim().to_string(),
        })
    }

    async fn probe(&self, query: &str) -> Option<SqlRejection> {
        let result = match self.database.run(&probe_statement(query)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "SQL probe failed");
                return Some(SqlRejection::ProbeFailed);
            }
        };

        match probe_count(&result) {
            Some(count) => {
                tracing::debug!(count, max = self.config.max_result_rows, "SQL probe count");
                SqlRejection::classify(count, self.config.max_result_rows)
            }
            None => Some(SqlRejection::ProbeFailed),
        }
    }
}

impl fmt::Debug for SqlGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlGuard")
            .field("model", &self.model)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(SqlRejection::classify(0, 5), Some(SqlRejection::Empty));
        assert_eq!(SqlRejection::classify(1, 5), None);
        assert_eq!(SqlRejection::classify(4, 5), None);
        assert_eq!(SqlRejection::classify(5, 5), Some(SqlRejection::TooBig));
        assert_eq!(SqlRejection::classify(500, 5), Some(SqlRejection::TooBig));
    }

    #[test]
    fn test_rejection_messages() {
        assert!(SqlRejection::Empty.to_string().contains("empty"));
        assert!(SqlRejection::TooBig.to_string().contains("too big"));
        assert!(SqlRejection::ProbeFailed.to_string().contains("error"));
    }

    #[test]
    fn test_outcome_keys() {
        let rejected = SqlOutcome::Rejected {
            query: "SELECT * FROM orders".to_string(),
            reason: SqlRejection::TooBig,
        };
        assert_eq!(rejected.sql_query(), "SELECT * FROM orders");
        assert!(rejected.sql_result().contains("too big"));

        let conversational = SqlOutcome::Conversational("Which year?".to_string());
        assert_eq!(conversational.sql_result(), "Which year?");
        assert_eq!(conversational.sql_query(), "");
    }
}
