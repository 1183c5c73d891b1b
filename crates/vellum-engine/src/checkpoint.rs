//! Full-state checkpoint file.
//!
//! The checkpoint holds every collection and every materialized index as of
//! one commit. It is written to a temporary file in the store directory and
//! renamed over the previous checkpoint, so a crash leaves either the old or
//! the new file, never a partial one.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::extension::ExtensionIndex;
use crate::snapshot::{Record, Snapshot};

const FORMAT: u32 = 1;

/// Persisted form of one materialized index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct PersistedIndex {
    pub collection: String,
    pub index: ExtensionIndex,
    /// Keys written after the index was last maintained.
    pub stale_keys: BTreeSet<String>,
    /// The collection was cleared after the index was last maintained.
    pub cleared: bool,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct CheckpointFile {
    format: u32,
    pub commit: u64,
    pub collections: BTreeMap<String, BTreeMap<String, Record>>,
    pub extensions: BTreeMap<String, PersistedIndex>,
}

impl CheckpointFile {
    pub fn capture(snapshot: &Snapshot, extensions: BTreeMap<String, PersistedIndex>) -> Self {
        let collections = snapshot
            .collections
            .iter()
            .map(|(name, records)| {
                let records = records
                    .iter()
                    .map(|(key, record)| (key.clone(), Record::clone(record)))
                    .collect();
                (name.clone(), records)
            })
            .collect();

        Self {
            format: FORMAT,
            commit: snapshot.commit,
            collections,
            extensions,
        }
    }

    /// Collections of the checkpoint as a snapshot without extensions.
    pub fn restore_collections(&mut self) -> Snapshot {
        let collections = std::mem::take(&mut self.collections)
            .into_iter()
            .map(|(name, records)| {
                let records = records
                    .into_iter()
                    .map(|(key, record)| (key, Arc::new(record)))
                    .collect();
                (name, Arc::new(records))
            })
            .collect();

        Snapshot {
            commit: self.commit,
            collections,
            extensions: BTreeMap::new(),
        }
    }

    pub fn write(&self, dir: &Path, target: &Path) -> EngineResult<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            bincode::serialize_into(&mut writer, self)
                .map_err(|e| EngineError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| EngineError::Io(e.error))?;

        info!(
            commit = self.commit,
            collections = self.collections.len(),
            extensions = self.extensions.len(),
            path = %target.display(),
            "checkpoint written"
        );
        Ok(())
    }

    /// Load a checkpoint. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> EngineResult<Option<Self>> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| EngineError::CorruptCheckpoint {
            path: path.to_path_buf(),
            reason,
        };

        let mut checkpoint: Self = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| corrupt(e.to_string()))?;
        if checkpoint.format != FORMAT {
            return Err(corrupt(format!("unsupported format {}", checkpoint.format)));
        }
        for persisted in checkpoint.extensions.values_mut() {
            persisted.index.rebuild_locations();
        }
        Ok(Some(checkpoint))
    }
}
