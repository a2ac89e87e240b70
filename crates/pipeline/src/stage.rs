//! Source kinds, the stage contract and the shared per-turn context.
//!
//! Every stage returns a partial [`StageContext`] holding only its own keys.
//! Partial contexts are combined with [`StageContext::merge`], a pure
//! reduction, so stages never share mutable state.

use relay_core::sources::SourceConfig;
use relay_core::AppResult;
use relay_prompt::templates;
use relay_sources::StageInput;
use serde::Serialize;
use std::fmt;

/// One pluggable source of supplementary information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Documents,
    Sql,
    Api,
    Tools,
}

impl SourceKind {
    /// Every kind, in stage and fragment order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Documents,
        SourceKind::Sql,
        SourceKind::Api,
        SourceKind::Tools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Documents => "documents",
            SourceKind::Sql => "sql",
            SourceKind::Api => "api",
            SourceKind::Tools => "tools",
        }
    }

    /// Context keys this kind's stage fills.
    pub fn output_keys(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Documents => &["relevantDocs", "references"],
            SourceKind::Sql => &["sqlResult", "sqlQuery"],
            SourceKind::Api => &["openAPIResult"],
            SourceKind::Tools => &["mcpToolsResult"],
        }
    }

    /// Answer-prompt fragment referencing [`Self::output_keys`].
    pub fn fragment(&self) -> &'static str {
        match self {
            SourceKind::Documents => templates::DOCUMENTS_FRAGMENT,
            SourceKind::Sql => templates::SQL_FRAGMENT,
            SourceKind::Api => templates::API_FRAGMENT,
            SourceKind::Tools => templates::TOOLS_FRAGMENT,
        }
    }

    /// Whether `config` carries a descriptor for this kind.
    pub fn is_configured(&self, config: &SourceConfig) -> bool {
        match self {
            SourceKind::Documents => config.index.is_some(),
            SourceKind::Sql => config.database.is_some(),
            SourceKind::Api => config.api.is_some(),
            SourceKind::Tools => config.tools.is_some(),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results gathered for one turn, one optional field per stage key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_docs: Option<String>,

    /// Reference names, newline-joined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_result: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    #[serde(rename = "openAPIResult", skip_serializing_if = "Option::is_none")]
    pub open_api_result: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_tools_result: Option<String>,
}

impl StageContext {
    pub fn documents(relevant_docs: impl Into<String>, references: &[String]) -> Self {
        Self {
            relevant_docs: Some(relevant_docs.into()),
            references: Some(references.join("\n")),
            ..Self::default()
        }
    }

    pub fn sql(result: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            sql_result: Some(result.into()),
            sql_query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn api(result: impl Into<String>) -> Self {
        Self {
            open_api_result: Some(result.into()),
            ..Self::default()
        }
    }

    pub fn tools(result: impl Into<String>) -> Self {
        Self {
            mcp_tools_result: Some(result.into()),
            ..Self::default()
        }
    }

    /// Contribution of a failed stage: the message in its primary key and
    /// empty strings in the rest, so every key its fragment names is present.
    pub fn failed(kind: SourceKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            SourceKind::Documents => Self::documents(message, &[]),
            SourceKind::Sql => Self::sql(message, ""),
            SourceKind::Api => Self::api(message),
            SourceKind::Tools => Self::tools(message),
        }
    }

    /// Combine two partial contexts; keys present in `other` win.
    pub fn merge(self, other: StageContext) -> StageContext {
        StageContext {
            relevant_docs: other.relevant_docs.or(self.relevant_docs),
            references: other.references.or(self.references),
            sql_result: other.sql_result.or(self.sql_result),
            sql_query: other.sql_query.or(self.sql_query),
            open_api_result: other.open_api_result.or(self.open_api_result),
            mcp_tools_result: other.mcp_tools_result.or(self.mcp_tools_result),
        }
    }

    /// Names of the keys present.
    pub fn keys(&self) -> Vec<&'static str> {
        [
            ("relevantDocs", self.relevant_docs.is_some()),
            ("references", self.references.is_some()),
            ("sqlResult", self.sql_result.is_some()),
            ("sqlQuery", self.sql_query.is_some()),
            ("openAPIResult", self.open_api_result.is_some()),
            ("mcpToolsResult", self.mcp_tools_result.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, present)| present.then_some(key))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Variables for the answer prompt: the present keys plus the user rules
    /// and context.
    pub fn variables(&self, user_rules: &str, user_context: &str) -> serde_json::Value {
        let mut vars = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        vars.insert("userPrompt".to_string(), user_rules.into());
        vars.insert("userContext".to_string(), user_context.into());
        serde_json::Value::Object(vars)
    }
}

/// The unit of work executing one source's contribution for a turn.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Open connections ahead of the first turn.
    async fn initialize(&self) -> AppResult<()> {
        Ok(())
    }

    /// Produce this stage's partial context.
    async fn run(&self, input: &StageInput) -> AppResult<StageContext>;

    /// Release connections.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_keys_match_fragments() {
        for kind in SourceKind::ALL {
            let mut keys: Vec<String> = kind.output_keys().iter().map(|k| k.to_string()).collect();
            let mut found = relay_prompt::placeholders(kind.fragment());
            keys.sort();
            found.sort();
            assert_eq!(keys, found, "fragment of {} out of sync", kind);
        }
    }

    #[test]
    fn test_failed_context_fills_every_key() {
        for kind in SourceKind::ALL {
            let context = StageContext::failed(kind, format!("{} stage failed: boom", kind));
            let mut keys = context.keys();
            keys.sort();
            let mut expected = kind.output_keys().to_vec();
            expected.sort();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn test_merge_is_a_union() {
        let merged = StageContext::default()
            .merge(StageContext::sql("3 orders", "SELECT COUNT(*) FROM orders"))
            .merge(StageContext::api("ok"));
        assert_eq!(merged.keys(), vec!["sqlResult", "sqlQuery", "openAPIResult"]);
        assert_eq!(merged.sql_result.as_deref(), Some("3 orders"));
    }

    #[test]
    fn test_variables() {
        let vars = StageContext::api("done").variables("be brief", "");
        assert_eq!(vars["openAPIResult"], "done");
        assert_eq!(vars["userPrompt"], "be brief");
        assert!(vars.get("sqlResult").is_none());
    }

    #[test]
    fn test_is_configured() {
        let mut config = SourceConfig::default();
        assert!(SourceKind::ALL.iter().all(|k| !k.is_configured(&config)));
        config.api = Some(relay_core::sources::ApiSourceConfig::with_schema("s"));
        assert!(SourceKind::Api.is_configured(&config));
        assert!(!SourceKind::Sql.is_configured(&config));
    }
}
