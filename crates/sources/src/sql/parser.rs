//! Extraction and probing of model-written SQL.

use crate::fenced::extract_block;

const STATEMENT_KEYWORDS: [&str; 4] = ["select", "update", "delete", "insert"];

/// Stop sequence for query generation.
pub const SQL_STOP: &str = "\nSQLResult:";

/// Extract the SQL statement from model output.
///
/// Output that already starts with a statement keyword is returned as-is.
/// Otherwise the first fenced `sql` block is used. `None` means the output is
/// not SQL (a clarification or a direct answer) and must not be executed.
pub fn parse_sql(text: &str) -> Option<String> {
    if starts_with_statement(text) {
        return Some(text.to_string());
    }

    let trimmed = text.trim();
    if starts_with_statement(trimmed) {
        return Some(trimmed.to_string());
    }

    extract_block(trimmed, &["sql", "sqlite"])
}

fn starts_with_statement(text: &str) -> bool {
    let lower = text.to_lowercase();
    STATEMENT_KEYWORDS.iter().any(|k| {
        lower.starts_with(k)
            && !lower[k.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

/// Wrap a statement in a row-count probe.
pub fn probe_statement(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT COUNT(*) AS resultCount FROM ({}) AS probe", inner)
}

/// Read the count from a probe result (`[{"resultCount": n}]`).
pub fn probe_count(result: &str) -> Option<u64> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(result).ok()?;
    let row = rows.first()?;
    let value = row
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("resultCount"))
        .map(|(_, v)| v)?;

    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
