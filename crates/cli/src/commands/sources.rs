//! Sources command handler.
//!
//! Shows which sources the configuration activates and the answer prompt
//! they compose, without calling the model.

use super::{print_json, prompts_dir, session_pipeline};
use clap::Args;
use relay_core::{config::AppConfig, AppResult};
use relay_prompt::list_prompt_files;

/// Show active sources and the answer prompt
#[derive(Args, Debug)]
pub struct SourcesCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SourcesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing sources command");

        let pipeline = session_pipeline(config)?;
        let kinds = pipeline.kinds();
        let overrides = list_prompt_files(&prompts_dir(config))?;

        if self.json {
            return print_json(&serde_json::json!({
                "sources": kinds,
                "promptOverrides": overrides,
                "systemTemplate": pipeline.system_template(),
            }));
        }

        if kinds.is_empty() {
            println!("Active sources: none");
        } else {
            let names: Vec<_> = kinds.iter().map(|k| k.as_str()).collect();
            println!("Active sources: {}", names.join(", "));
        }
        if !overrides.is_empty() {
            println!("Prompt overrides: {}", overrides.join(", "));
        }
        println!();
        println!("{}", pipeline.system_template());

        Ok(())
    }
}
