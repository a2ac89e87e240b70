//! Source-kind to stage-factory registry.

use crate::stage::{SourceKind, Stage};
use crate::stages::{ApiStage, DocumentsStage, SqlStage, StageDeps, ToolsStage};
use relay_core::sources::{SourceConfig, ToolSourceConfig};
use relay_core::AppResult;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds the stage for one kind, or `None` when the kind is inactive.
pub type StageFactory = fn(&SourceConfig, &StageDeps) -> AppResult<Option<Arc<dyn Stage>>>;

fn documents_stage(config: &SourceConfig, deps: &StageDeps) -> AppResult<Option<Arc<dyn Stage>>> {
    Ok(config.index.clone().map(|index| {
        Arc::new(DocumentsStage::new(index, deps.document_index.clone())) as Arc<dyn Stage>
    }))
}

fn sql_stage(config: &SourceConfig, deps: &StageDeps) -> AppResult<Option<Arc<dyn Stage>>> {
    Ok(config
        .database
        .clone()
        .map(|database| Arc::new(SqlStage::new(database, deps.clone())) as Arc<dyn Stage>))
}

fn api_stage(config: &SourceConfig, deps: &StageDeps) -> AppResult<Option<Arc<dyn Stage>>> {
    match config.api {
        Some(ref api) => Ok(Some(Arc::new(ApiStage::new(api.clone(), deps)?))),
        None => Ok(None),
    }
}

fn tools_stage(config: &SourceConfig, deps: &StageDeps) -> AppResult<Option<Arc<dyn Stage>>> {
    // Wrapped agents activate the tool loop even without servers
    let tools = match config.tools {
        Some(ref tools) => tools.clone(),
        None if !deps.agents.is_empty() => ToolSourceConfig::default(),
        None => return Ok(None),
    };
    Ok(Some(Arc::new(ToolsStage::new(tools, deps.clone()))))
}

/// Built-in factory for a kind.
pub fn default_factory(kind: SourceKind) -> StageFactory {
    match kind {
        SourceKind::Documents => documents_stage,
        SourceKind::Sql => sql_stage,
        SourceKind::Api => api_stage,
        SourceKind::Tools => tools_stage,
    }
}

/// Maps every source kind to the factory that builds its stage.
#[derive(Clone)]
pub struct StageRegistry {
    factories: BTreeMap<SourceKind, StageFactory>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self {
            factories: SourceKind::ALL
                .into_iter()
                .map(|kind| (kind, default_factory(kind)))
                .collect(),
        }
    }
}

impl StageRegistry {
    /// Replace the factory of one kind.
    pub fn register(mut self, kind: SourceKind, factory: StageFactory) -> Self {
        self.factories.insert(kind, factory);
        self
    }

    /// Validate the configuration and build the active stages in
    /// [`SourceKind::ALL`] order.
    pub fn build(&self, config: &SourceConfig, deps: &StageDeps) -> AppResult<Vec<Arc<dyn Stage>>> {
        config.validate()?;

        let mut stages = Vec::new();
        for (kind, factory) in &self.factories {
            if let Some(stage) = factory(config, deps)? {
                tracing::debug!(kind = %kind, "Built stage");
                stages.push(stage);
            }
        }
        Ok(stages)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::sources::{ApiSourceConfig, DatabaseSourceConfig};
    use relay_llm::ScriptedClient;

    fn deps() -> StageDeps {
        StageDeps::new(Arc::new(ScriptedClient::from_texts(&["x"])), "m")
    }

    #[test]
    fn test_no_sources_no_stages() {
        let stages = StageRegistry::default()
            .build(&SourceConfig::default(), &deps())
            .unwrap();
        assert!(stages.is_empty());
    }

    #[test]
    fn test_stage_order_follows_kinds() {
        let config = SourceConfig {
            api: Some(ApiSourceConfig::with_schema("openapi: 3.0.0")),
            database: Some(DatabaseSourceConfig::sqlite(":memory:")),
            ..SourceConfig::default()
        };
        let stages = StageRegistry::default().build(&config, &deps()).unwrap();
        let kinds: Vec<_> = stages.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![SourceKind::Sql, SourceKind::Api]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SourceConfig {
            database: Some(DatabaseSourceConfig {
                max_result_rows: 0,
                ..DatabaseSourceConfig::sqlite(":memory:")
            }),
            ..SourceConfig::default()
        };
        assert!(StageRegistry::default().build(&config, &deps()).is_err());
    }

    #[test]
    fn test_register_replaces_factory() {
        fn never(_: &SourceConfig, _: &StageDeps) -> AppResult<Option<Arc<dyn Stage>>> {
            Ok(None)
        }

        let config = SourceConfig {
            api: Some(ApiSourceConfig::with_schema("openapi: 3.0.0")),
            ..SourceConfig::default()
        };
        let stages = StageRegistry::default()
            .register(SourceKind::Api, never)
            .build(&config, &deps())
            .unwrap();
        assert!(stages.is_empty());
    }
}
