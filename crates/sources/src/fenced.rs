//! Fenced code block extraction from model output.

use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+\-]*)[ \t]*\r?\n?(.*?)```").expect("Invalid regex")
});

/// Content of the first fenced block whose language tag is one of `tags`
/// (case-insensitive), with the fence markers and tag removed.
///
/// Blocks with other tags are skipped, so unrelated fenced text elsewhere in
/// the output does not interfere. Empty blocks yield `None`.
pub fn extract_block(text: &str, tags: &[&str]) -> Option<String> {
    FENCE
        .captures_iter(text)
        .find(|caps| {
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
        })
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_tagged_block() {
        let text = "Here you go:\n```sql\nSELECT * FROM orders;\n```\nDone.";
        assert_eq!(
            extract_block(text, &["sql"]),
            Some("SELECT * FROM orders;".to_string())
        );
    }

    #[test]
    fn test_tag_is_case_insensitive() {
        let text = "```SQL\nselect 1\n```";
        assert_eq!(extract_block(text, &["sql"]), Some("select 1".to_string()));
    }

    #[test]
    fn test_skips_unrelated_blocks() {
        let text = "```python\nprint(1)\n```\nthen\n```bash\ncurl https://a.test\n```\n```bash\ncurl https://b.test\n```";
        assert_eq!(
            extract_block(text, &["bash", "sh"]),
            Some("curl https://a.test".to_string())
        );
    }

    #[test]
    fn test_single_line_block() {
        assert_eq!(
            extract_block("```sql SELECT 2```", &["sql"]),
            Some("SELECT 2".to_string())
        );
    }

    #[test]
    fn test_no_match() {
        assert_eq!(extract_block("no fences here", &["sql"]), None);
        assert_eq!(extract_block("```sql\n\n```", &["sql"]), None);
        assert_eq!(extract_block("```js\nx()\n```", &["sql"]), None);
    }
}
