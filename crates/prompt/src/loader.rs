//! Loads template overrides from the workspace.
//!
//! Any file named `<id>.hbs` in `.relay/prompts/` replaces the built-in
//! template with that id (see [`PromptId`]).

use crate::builder::check_template;
use crate::types::{PromptId, PromptSet};
use relay_core::{AppError, AppResult};
use std::path::Path;

/// Load the prompt set for a workspace, falling back to built-ins.
///
/// # Example
/// ```no_run
/// use relay_prompt::load_prompt_set;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompts = load_prompt_set(Path::new(".relay/prompts"))?;
/// println!("Overridden: {:?}", prompts.overridden);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt_set(prompts_dir: &Path) -> AppResult<PromptSet> {
    let mut set = PromptSet::default();

    if !prompts_dir.exists() {
        return Ok(set);
    }

    for id in PromptId::ALL {
        let file = prompts_dir.join(format!("{}.hbs", id.as_str()));
        if !file.is_file() {
            continue;
        }

        let contents = std::fs::read_to_string(&file).map_err(|e| {
            AppError::Prompt(format!("Failed to read prompt file {:?}: {}", file, e))
        })?;

        if contents.trim().is_empty() {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} is empty",
                file
            )));
        }

        check_template(&contents)
            .map_err(|e| AppError::Prompt(format!("Invalid template {:?}: {}", file, e)))?;

        tracing::debug!(prompt = id.as_str(), "Loaded prompt override");
        set.set(id, contents);
    }

    for stem in list_prompt_files(prompts_dir)? {
        if PromptId::parse(&stem).is_none() {
            tracing::warn!(file = %stem, "Ignoring unknown prompt override");
        }
    }

    Ok(set)
}

/// List the stems of all `.hbs` files in the prompts directory.
pub fn list_prompt_files(prompts_dir: &Path) -> AppResult<Vec<String>> {
    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(prompts_dir).map_err(|e| {
        AppError::Prompt(format!("Failed to read prompts directory {:?}: {}", prompts_dir, e))
    })?;

    let mut stems = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("hbs") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();

    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dir_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let set = load_prompt_set(&temp_dir.path().join("prompts")).unwrap();
        assert_eq!(set, PromptSet::default());
    }

    #[test]
    fn test_override_replaces_template() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("sql-summary.hbs"),
            "Answer {{question}} from {{response}}",
        )
        .unwrap();
        fs::write(temp_dir.path().join("notes.hbs"), "ignored").unwrap();

        let set = load_prompt_set(temp_dir.path()).unwrap();
        assert_eq!(set.sql_summary, "Answer {{question}} from {{response}}");
        assert_eq!(set.overridden, vec![PromptId::SqlSummary]);
        assert_eq!(set.answer, PromptSet::default().answer);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("answer.hbs"), "{{#if x}}unclosed").unwrap();

        assert!(load_prompt_set(temp_dir.path()).is_err());
    }

    #[test]
    fn test_list_prompt_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("tools.hbs"), "a").unwrap();
        fs::write(temp_dir.path().join("answer.hbs"), "b").unwrap();
        fs::write(temp_dir.path().join("readme.md"), "c").unwrap();

        let stems = list_prompt_files(temp_dir.path()).unwrap();
        assert_eq!(stems, vec!["answer".to_string(), "tools".to_string()]);
    }
}
