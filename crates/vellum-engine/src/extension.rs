use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::snapshot::Snapshot;

/// Materialized index maintained by an [`Extension`].
///
/// Groups map to ordered key lists. The engine stores the index inside every
/// snapshot, so readers always see the index as of their snapshot's commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionIndex {
    groups: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    locations: HashMap<String, String>,
}

impl ExtensionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from already ordered group lists.
    pub fn from_groups(groups: BTreeMap<String, Vec<String>>) -> Self {
        let mut index = Self {
            groups,
            locations: HashMap::new(),
        };
        index.rebuild_locations();
        index
    }

    /// Restore the key -> group lookup after deserialization.
    pub(crate) fn rebuild_locations(&mut self) {
        self.groups.retain(|_, keys| !keys.is_empty());
        self.locations = self
            .groups
            .iter()
            .flat_map(|(group, keys)| keys.iter().map(move |k| (k.clone(), group.clone())))
            .collect();
    }

    /// Names of all non-empty groups, in lexicographic order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Ordered keys of one group (empty if the group has no items).
    pub fn keys_in(&self, group: &str) -> &[String] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Group currently holding `key`.
    pub fn group_of(&self, key: &str) -> Option<&str> {
        self.locations.get(key).map(String::as_str)
    }

    /// Group and index of `key`.
    pub fn position_of(&self, key: &str) -> Option<(&str, usize)> {
        let group = self.locations.get(key)?;
        let index = self.groups.get(group)?.iter().position(|k| k == key)?;
        Some((group.as_str(), index))
    }

    /// Total number of indexed keys.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Insert `key` into `group` at `index` (clamped to the group length).
    ///
    /// A key already present elsewhere in the index is removed first.
    pub fn insert_at(&mut self, group: &str, index: usize, key: &str) {
        self.remove(key);
        let keys = self.groups.entry(group.to_string()).or_default();
        let index = index.min(keys.len());
        keys.insert(index, key.to_string());
        self.locations.insert(key.to_string(), group.to_string());
    }

    /// Remove `key`, returning the group and index it occupied.
    pub fn remove(&mut self, key: &str) -> Option<(String, usize)> {
        let group = self.locations.remove(key)?;
        let keys = self.groups.get_mut(&group)?;
        let index = keys.iter().position(|k| k == key)?;
        keys.remove(index);
        if keys.is_empty() {
            self.groups.remove(&group);
        }
        Some((group, index))
    }
}

/// A registrable materialized index over one collection.
///
/// The engine calls [`Extension::populate`] once when an index has to be
/// built from scratch and [`Extension::update`] with the keys a commit
/// touches in the extension's collection. Both run under the write gate and
/// see the post-commit snapshot; a failure aborts the commit.
pub trait Extension: Send + Sync + 'static {
    /// Persistent name of the materialized index.
    fn name(&self) -> &str;

    /// Collection the index is built over.
    fn collection(&self) -> &str;

    /// Extensions that must be registered, and maintained, before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Build the index from scratch.
    fn populate(&self, snapshot: &Snapshot) -> EngineResult<ExtensionIndex>;

    /// Bring the index up to date for a set of touched keys.
    ///
    /// Entries for keys outside `keys` are still accurate. `snapshot` does
    /// not contain this extension's own index while the update runs.
    fn update(
        &self,
        index: &mut ExtensionIndex,
        snapshot: &Snapshot,
        keys: &BTreeSet<String>,
    ) -> EngineResult<()>;
}

/// Outcome of registering an extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// No usable index existed under the name; one was built.
    Built,
    /// A persisted or already active index was reused.
    Reused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_position() {
        let mut index = ExtensionIndex::new();
        index.insert_at("adult", 0, "u1");
        index.insert_at("adult", 1, "u3");
        index.insert_at("adult", 1, "u2");
        index.insert_at("minor", 0, "u4");

        assert_eq!(index.keys_in("adult"), ["u1", "u2", "u3"]);
        assert_eq!(index.position_of("u3"), Some(("adult", 2)));
        assert_eq!(index.group_of("u4"), Some("minor"));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn insert_moves_existing_key() {
        let mut index = ExtensionIndex::new();
        index.insert_at("a", 0, "k");
        index.insert_at("b", 0, "k");
        assert_eq!(index.groups().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_drops_empty_groups() {
        let mut index = ExtensionIndex::new();
        index.insert_at("a", 0, "k1");
        assert_eq!(index.remove("k1"), Some(("a".to_string(), 0)));
        assert!(index.is_empty());
        assert_eq!(index.groups().count(), 0);
        assert!(index.remove("k1").is_none());
    }

    #[test]
    fn locations_survive_serialization() {
        let mut groups = BTreeMap::new();
        groups.insert("g".to_string(), vec!["x".to_string(), "y".to_string()]);
        let index = ExtensionIndex::from_groups(groups);

        let bytes = bincode::serialize(&index).unwrap();
        let mut restored: ExtensionIndex = bincode::deserialize(&bytes).unwrap();
        assert!(restored.group_of("x").is_none());
        restored.rebuild_locations();
        assert_eq!(restored.position_of("y"), Some(("g", 1)));
    }

    #[test]
    fn insert_index_is_clamped() {
        let mut index = ExtensionIndex::new();
        index.insert_at("g", 10, "k");
        assert_eq!(index.position_of("k"), Some(("g", 0)));
    }
}
