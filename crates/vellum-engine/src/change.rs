use std::collections::{BTreeMap, BTreeSet};

/// Key mutations of one collection within a single commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionChanges {
    /// `true` if the collection was cleared during the commit.
    pub cleared: bool,
    /// Every key that was set or removed, including keys dropped by a clear.
    pub keys: BTreeSet<String>,
}

/// The key mutations produced by one committed write transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    commit: u64,
    collections: BTreeMap<String, CollectionChanges>,
}

impl ChangeSet {
    pub(crate) fn new(commit: u64) -> Self {
        Self {
            commit,
            collections: BTreeMap::new(),
        }
    }

    pub(crate) fn set_commit(&mut self, commit: u64) {
        self.commit = commit;
    }

    pub(crate) fn record_key(&mut self, collection: &str, key: &str) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .keys
            .insert(key.to_string());
    }

    pub(crate) fn record_clear<'a>(
        &mut self,
        collection: &str,
        removed: impl IntoIterator<Item = &'a str>,
    ) {
        let changes = self.collections.entry(collection.to_string()).or_default();
        changes.cleared = true;
        changes.keys.extend(removed.into_iter().map(str::to_string));
    }

    /// Commit number that produced this change set.
    pub fn commit(&self) -> u64 {
        self.commit
    }

    /// Returns `true` if the commit touched nothing.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Returns `true` if the commit touched `key` in `collection`.
    pub fn touches_key(&self, collection: &str, key: &str) -> bool {
        self.collections
            .get(collection)
            .is_some_and(|c| c.cleared || c.keys.contains(key))
    }

    /// Returns `true` if the commit touched anything in `collection`.
    pub fn touches_collection(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    /// Changes recorded for one collection.
    pub fn collection(&self, collection: &str) -> Option<&CollectionChanges> {
        self.collections.get(collection)
    }

    /// Names of all collections touched by the commit.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}
