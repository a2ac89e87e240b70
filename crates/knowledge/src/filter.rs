//! Metadata filters for similarity search.
//!
//! A filter expression is a `;`-separated list of `key=value` pairs; a
//! document matches when every pair matches its metadata. Configured filters
//! may contain `(key)` placeholders that are filled from the turn input
//! before parsing, e.g. `tenant=(userSessionId)`.

use relay_core::{AppError, AppResult};
use serde_json::{Map, Value};

/// Replace every `(key)` placeholder with its value.
///
/// Placeholders without a matching variable are left untouched.
pub fn interpolate_filter(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("({})", key), value);
    }
    result
}

/// Parsed metadata filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: Vec<(String, String)>,
}

impl MetadataFilter {
    /// Parse a `key=value[;key=value]` expression. Blank input matches all.
    pub fn parse(expression: &str) -> AppResult<Self> {
        let mut conditions = Vec::new();

        for part in expression.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                AppError::Index(format!("Invalid filter condition '{}': expected key=value", part))
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(AppError::Index(format!(
                    "Invalid filter condition '{}': empty key",
                    part
                )));
            }
            conditions.push((key.to_string(), value.trim().to_string()));
        }

        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether the metadata satisfies every condition.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|(key, expected)| match metadata.get(key) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == *expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpolate_filter() {
        let filter = interpolate_filter(
            "tenant=(userSessionId);thread=(chatThreadID);tag=(missing)",
            &[("userSessionId", "u-1"), ("chatThreadID", "t-9")],
        );
        assert_eq!(filter, "tenant=u-1;thread=t-9;tag=(missing)");
    }

    #[test]
    fn test_interpolate_repeated_placeholder() {
        let filter = interpolate_filter("a=(q);b=(q)", &[("q", "x")]);
        assert_eq!(filter, "a=x;b=x");
    }

    #[test]
    fn test_parse_and_match() {
        let filter = MetadataFilter::parse(" tenant = acme ; year=2024 ").unwrap();
        let metadata = json!({"tenant": "acme", "year": 2024})
            .as_object()
            .cloned()
            .unwrap();
        assert!(filter.matches(&metadata));

        let other = json!({"tenant": "globex", "year": 2024})
            .as_object()
            .cloned()
            .unwrap();
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_blank_filter_matches_all() {
        let filter = MetadataFilter::parse("  ").unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&Map::new()));
    }

    #[test]
    fn test_invalid_filter() {
        assert!(MetadataFilter::parse("tenant").is_err());
        assert!(MetadataFilter::parse("=x").is_err());
    }
}
