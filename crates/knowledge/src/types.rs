//! Document types for the index source.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the originating file or URL of a document.
pub const SOURCE_KEY: &str = "source";

/// A unit of indexed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier (UUID v4 unless supplied)
    pub id: String,

    /// Text that is embedded and returned to the prompt
    pub page_content: String,

    /// Arbitrary metadata, used for filtering and references
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// New document with a generated id and no metadata.
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `source` metadata value, if present.
    pub fn source(&self) -> Option<String> {
        self.metadata.get(SOURCE_KEY).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Documents retrieved for one question, shaped for the answer prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    /// Page contents joined by newlines
    pub relevant_docs: String,

    /// Distinct `source` values in rank order
    pub references: Vec<String>,
}

impl RetrievedContext {
    /// Build from ranked results.
    pub fn from_ranked(results: &[(Document, f32)]) -> Self {
        let relevant_docs = results
            .iter()
            .map(|(doc, _)| doc.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut references: Vec<String> = Vec::new();
        for source in results.iter().filter_map(|(doc, _)| doc.source()) {
            if !references.contains(&source) {
                references.push(source);
            }
        }

        Self {
            relevant_docs,
            references,
        }
    }
}
