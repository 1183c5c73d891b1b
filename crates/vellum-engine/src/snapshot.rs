use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::extension::ExtensionIndex;

/// One stored value: the serialized object and its serialized metadata.
///
/// The engine never interprets either byte string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub object: Vec<u8>,
    pub metadata: Option<Vec<u8>>,
}

impl Record {
    pub fn new(object: Vec<u8>, metadata: Option<Vec<u8>>) -> Self {
        Self { object, metadata }
    }
}

pub(crate) type CollectionMap = BTreeMap<String, Arc<Record>>;

/// Immutable view of the store as of one commit.
///
/// Cloning is cheap: collections and extension indices are shared
/// copy-on-write with every other snapshot that has not modified them.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub(crate) commit: u64,
    pub(crate) collections: BTreeMap<String, Arc<CollectionMap>>,
    pub(crate) extensions: BTreeMap<String, Arc<ExtensionIndex>>,
}

impl Snapshot {
    /// Commit number this snapshot reflects.
    pub fn commit(&self) -> u64 {
        self.commit
    }

    /// Raw record stored under `key`.
    pub fn record(&self, collection: &str, key: &str) -> Option<&Record> {
        self.collections
            .get(collection)
            .and_then(|c| c.get(key))
            .map(Arc::as_ref)
    }

    /// Serialized object stored under `key`.
    pub fn get(&self, collection: &str, key: &str) -> Option<&[u8]> {
        self.record(collection, key).map(|r| r.object.as_slice())
    }

    /// Serialized metadata stored under `key`.
    pub fn metadata(&self, collection: &str, key: &str) -> Option<&[u8]> {
        self.record(collection, key)
            .and_then(|r| r.metadata.as_deref())
    }

    pub fn contains(&self, collection: &str, key: &str) -> bool {
        self.record(collection, key).is_some()
    }

    /// Number of keys in a collection (zero if it was never written).
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    /// Keys of a collection in lexicographic order.
    pub fn keys<'a>(&'a self, collection: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.keys().map(String::as_str))
    }

    /// Key/record pairs of a collection in lexicographic key order.
    pub fn iter<'a>(&'a self, collection: &str) -> impl Iterator<Item = (&'a str, &'a Record)> + 'a {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.iter().map(|(k, r)| (k.as_str(), r.as_ref())))
    }

    /// Visit key/record pairs in key order until `f` breaks.
    pub fn enumerate(&self, collection: &str, mut f: impl FnMut(&str, &Record) -> ControlFlow<()>) {
        for (key, record) in self.iter(collection) {
            if f(key, record).is_break() {
                break;
            }
        }
    }

    /// Names of collections holding at least one key.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Materialized index of a registered extension.
    pub fn extension(&self, name: &str) -> EngineResult<&ExtensionIndex> {
        self.extensions
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| EngineError::MissingExtension(name.to_string()))
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    /// Names of extensions present in this snapshot.
    pub fn extension_names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(entries: &[(&str, &str, &[u8])]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (collection, key, data) in entries {
            Arc::make_mut(snapshot.collections.entry(collection.to_string()).or_default())
                .insert(key.to_string(), Arc::new(Record::new(data.to_vec(), None)));
        }
        snapshot
    }

    #[test]
    fn reads_records() {
        let snap = snapshot_with(&[("users", "u2", b"b"), ("users", "u1", b"a")]);
        assert_eq!(snap.get("users", "u1"), Some(&b"a"[..]));
        assert!(snap.metadata("users", "u1").is_none());
        assert!(snap.contains("users", "u2"));
        assert!(!snap.contains("teams", "u2"));
        assert_eq!(snap.len("users"), 2);
        assert_eq!(snap.keys("users").collect::<Vec<_>>(), vec!["u1", "u2"]);
        assert_eq!(snap.collections().collect::<Vec<_>>(), vec!["users"]);
    }

    #[test]
    fn enumerate_stops_on_break() {
        let snap = snapshot_with(&[("users", "a", b"1"), ("users", "b", b"2"), ("users", "c", b"3")]);
        let mut seen = Vec::new();
        snap.enumerate("users", |key, record| {
            seen.push((key.to_string(), record.object.clone()));
            if key == "b" {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]);
    }

    #[test]
    fn missing_collection_is_empty() {
        let snap = Snapshot::default();
        assert_eq!(snap.len("nothing"), 0);
        assert_eq!(snap.iter("nothing").count(), 0);
    }

    #[test]
    fn missing_extension_is_an_error() {
        let snap = Snapshot::default();
        let err = snap.extension("view").unwrap_err();
        assert!(matches!(err, EngineError::MissingExtension(name) if name == "view"));
    }
}
