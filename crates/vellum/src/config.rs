use std::path::Path;

use serde::{Deserialize, Serialize};
use vellum_engine::EngineConfig;

use crate::error::{VellumError, VellumResult};

/// Configuration for a [`Database`](crate::Database).
///
/// ```toml
/// prune_orphaned_views = true
///
/// [engine]
/// sync_mode = "every_commit"
/// checkpoint_threshold = 512
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: EngineConfig,
    /// Drop persisted view indices that were not registered this session
    /// when the database closes.
    pub prune_orphaned_views: bool,
}

impl DatabaseConfig {
    pub fn from_toml_str(source: &str) -> VellumResult<Self> {
        toml::from_str(source).map_err(|e| VellumError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> VellumResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> VellumResult<String> {
        toml::to_string(self).map_err(|e| VellumError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_engine::SyncMode;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(DatabaseConfig::from_toml_str("").unwrap(), DatabaseConfig::default());
    }

    #[test]
    fn parses_engine_section() {
        let config = DatabaseConfig::from_toml_str(
            r#"
            prune_orphaned_views = true

            [engine]
            sync_mode = "every_commit"
            checkpoint_threshold = 16
            "#,
        )
        .unwrap();
        assert!(config.prune_orphaned_views);
        assert_eq!(config.engine.sync_mode, SyncMode::EveryCommit);
        assert_eq!(config.engine.checkpoint_threshold, Some(16));
        assert_eq!(config.engine.event_capacity, EngineConfig::default().event_capacity);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = DatabaseConfig::default();
        config.prune_orphaned_views = true;
        config.engine.event_capacity = 8;
        let text = config.to_toml_string().unwrap();
        assert_eq!(DatabaseConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn invalid_document_is_a_config_error() {
        let err = DatabaseConfig::from_toml_str("[engine]\nsync_mode = \"sometimes\"").unwrap_err();
        assert!(matches!(err, VellumError::Config(_)));
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.toml");
        std::fs::write(&path, "prune_orphaned_views = true\n").unwrap();
        assert!(DatabaseConfig::load(&path).unwrap().prune_orphaned_views);
    }
}
