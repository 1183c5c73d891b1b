use serde::{Deserialize, Serialize};

/// When the write-ahead log is forced to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every commit.
    EveryCommit,
    /// Flush to the OS and let it decide when to sync.
    #[default]
    OsDefault,
}

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// WAL durability strategy.
    pub sync_mode: SyncMode,
    /// Capacity of the modified-event broadcast channel.
    pub event_capacity: usize,
    /// Write a checkpoint after this many commits (`None` = only on demand).
    pub checkpoint_threshold: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            event_capacity: 256,
            checkpoint_threshold: Some(1024),
        }
    }
}
