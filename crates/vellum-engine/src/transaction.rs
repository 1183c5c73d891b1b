use std::ops::Deref;
use std::sync::Arc;

use crate::change::ChangeSet;
use crate::snapshot::{Record, Snapshot};
use crate::wal::WalOp;

/// Read side of a transaction: an immutable snapshot.
pub type ReadTransaction = Snapshot;

/// Read-write transaction handed to [`Engine::write`](crate::Engine::write).
///
/// Mutations apply to a private copy of the latest snapshot; readers see them
/// only once the closure returns `Ok` and the commit is published. Reads
/// through the transaction (via `Deref<Target = Snapshot>`) observe the
/// transaction's own writes.
pub struct WriteTransaction {
    working: Snapshot,
    changes: ChangeSet,
    ops: Vec<WalOp>,
}

impl WriteTransaction {
    pub(crate) fn new(base: Snapshot) -> Self {
        let commit = base.commit;
        Self {
            working: base,
            changes: ChangeSet::new(commit),
            ops: Vec::new(),
        }
    }

    /// Store `object` (and optional `metadata`) under `key`.
    pub fn set(&mut self, collection: &str, key: &str, object: Vec<u8>, metadata: Option<Vec<u8>>) {
        let record = Record::new(object, metadata);
        self.ops.push(WalOp::Set {
            collection: collection.to_string(),
            key: key.to_string(),
            record: record.clone(),
        });
        apply_set(&mut self.working, collection, key, record);
        self.changes.record_key(collection, key);
    }

    /// Remove `key`. Returns `true` if it existed.
    pub fn remove(&mut self, collection: &str, key: &str) -> bool {
        if !apply_remove(&mut self.working, collection, key) {
            return false;
        }
        self.ops.push(WalOp::Remove {
            collection: collection.to_string(),
            key: key.to_string(),
        });
        self.changes.record_key(collection, key);
        true
    }

    /// Remove every key of `collection`. Returns the number of keys removed.
    pub fn remove_all(&mut self, collection: &str) -> usize {
        let Some(map) = self.working.collections.remove(collection) else {
            return 0;
        };
        if map.is_empty() {
            return 0;
        }
        self.ops.push(WalOp::Clear {
            collection: collection.to_string(),
        });
        self.changes
            .record_clear(collection, map.keys().map(String::as_str));
        map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Snapshot, ChangeSet, Vec<WalOp>) {
        (self.working, self.changes, self.ops)
    }
}

impl Deref for WriteTransaction {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.working
    }
}

pub(crate) fn apply_set(snapshot: &mut Snapshot, collection: &str, key: &str, record: Record) {
    let map = snapshot
        .collections
        .entry(collection.to_string())
        .or_default();
    Arc::make_mut(map).insert(key.to_string(), Arc::new(record));
}

pub(crate) fn apply_remove(snapshot: &mut Snapshot, collection: &str, key: &str) -> bool {
    let Some(map) = snapshot.collections.get_mut(collection) else {
        return false;
    };
    if !map.contains_key(key) {
        return false;
    }
    Arc::make_mut(map).remove(key);
    if map.is_empty() {
        snapshot.collections.remove(collection);
    }
    true
}

/// Apply one logged operation to a snapshot during recovery.
pub(crate) fn apply_op(snapshot: &mut Snapshot, op: &WalOp, changes: &mut ChangeSet) {
    match op {
        WalOp::Set {
            collection,
            key,
            record,
        } => {
            apply_set(snapshot, collection, key, record.clone());
            changes.record_key(collection, key);
        }
        WalOp::Remove { collection, key } => {
            if apply_remove(snapshot, collection, key) {
                changes.record_key(collection, key);
            }
        }
        WalOp::Clear { collection } => {
            if let Some(map) = snapshot.collections.remove(collection) {
                changes.record_clear(collection, map.keys().map(String::as_str));
            }
        }
    }
}
