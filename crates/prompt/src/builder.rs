//! Prompt rendering and the system prompt composer.

use handlebars::Handlebars;
use relay_core::{AppError, AppResult};
use serde::Serialize;

/// Render a Handlebars template with variables.
///
/// HTML escaping is disabled: prompts are plain text. Missing variables
/// render as empty strings.
pub fn render_template<T: Serialize>(template: &str, variables: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .render_template(template, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

/// Check that a template compiles.
pub fn check_template(template: &str) -> Result<(), String> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("check", template)
        .map_err(|e| e.to_string())
}

/// Names of the simple `{{name}}` placeholders in a template, in order of
/// first appearance. Block helpers and paths are skipped.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
        rest = &after[end + 2..];
    }

    names
}

/// Builds the final system prompt from base instructions and one
/// fragment per active source.
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    base: String,
    fragments: Vec<String>,
}

impl PromptComposer {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            fragments: Vec::new(),
        }
    }

    /// Append a conditional fragment.
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragments.push(fragment.into());
        self
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// The unrendered template.
    pub fn template(&self) -> String {
        let mut template = self.base.clone();
        for fragment in &self.fragments {
            template.push_str(fragment);
        }
        template
    }

    /// Render the composed template.
    pub fn render<T: Serialize>(&self, variables: &T) -> AppResult<String> {
        render_template(&self.template(), variables)
    }
}
