use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;
use vellum_codec::{decode, peek_header, StorableObject};
use vellum_engine::{Engine, EngineResult, Extension, ExtensionIndex, Registration, Snapshot};

use crate::error::ViewResult;
use crate::mappings::ViewMappings;
use crate::view::{total_order, CollectionView};

/// Engine extension maintaining the materialized index of one view.
pub struct ViewExtension<V> {
    view: Arc<V>,
    name: String,
    collection: String,
    parent: Option<String>,
}

impl<V: CollectionView> ViewExtension<V> {
    pub fn new(view: Arc<V>, collection: &str) -> Self {
        Self {
            name: view.name(collection),
            parent: view.parent_name(collection),
            collection: collection.to_string(),
            view,
        }
    }

    fn object(&self, snapshot: &Snapshot, key: &str) -> Option<V::Object> {
        let bytes = snapshot.get(&self.collection, key)?;
        // Records of other types sharing the collection are not ours to report.
        let header = peek_header(bytes)?;
        if header.type_id != <V::Object as StorableObject>::TYPE_ID {
            return None;
        }
        decode::<V::Object>(bytes).into_valid()
    }

    /// Candidate keys and objects, in source order.
    fn candidates(&self, snapshot: &Snapshot) -> EngineResult<Vec<(String, V::Object)>> {
        match &self.parent {
            Some(parent) => {
                let parent_index = snapshot.extension(parent)?;
                Ok(parent_index
                    .groups()
                    .flat_map(|group| parent_index.keys_in(group))
                    .filter_map(|key| self.object(snapshot, key).map(|o| (key.clone(), o)))
                    .collect())
            }
            None => Ok(snapshot
                .keys(&self.collection)
                .filter_map(|key| self.object(snapshot, key).map(|o| (key.to_string(), o)))
                .collect()),
        }
    }
}

impl<V: CollectionView> Extension for ViewExtension<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn dependencies(&self) -> Vec<String> {
        self.parent.iter().cloned().collect()
    }

    fn populate(&self, snapshot: &Snapshot) -> EngineResult<ExtensionIndex> {
        let mut grouped: BTreeMap<String, Vec<(String, V::Object)>> = BTreeMap::new();
        for (key, object) in self.candidates(snapshot)? {
            if let Some(group) = self.view.filter(&key, &object) {
                grouped.entry(group).or_default().push((key, object));
            }
        }

        let groups = grouped
            .into_iter()
            .map(|(group, mut items)| {
                items.sort_by(|(k1, o1), (k2, o2)| total_order(self.view.as_ref(), k1, o1, k2, o2));
                (group, items.into_iter().map(|(key, _)| key).collect())
            })
            .collect();

        let index = ExtensionIndex::from_groups(groups);
        debug!(view = %self.name, items = index.len(), "view populated");
        Ok(index)
    }

    fn update(
        &self,
        index: &mut ExtensionIndex,
        snapshot: &Snapshot,
        keys: &BTreeSet<String>,
    ) -> EngineResult<()> {
        // Take every touched key out first so the remaining entries are
        // sorted by their current content.
        for key in keys {
            index.remove(key);
        }

        for key in keys {
            let Some(object) = self.object(snapshot, key) else {
                continue;
            };
            let Some(group) = self.view.filter(key, &object) else {
                continue;
            };
            let position = index.keys_in(&group).partition_point(|existing| {
                match self.object(snapshot, existing) {
                    Some(other) => total_order(self.view.as_ref(), existing, &other, key, &object).is_lt(),
                    None => true,
                }
            });
            index.insert_at(&group, position, key);
        }
        Ok(())
    }
}

/// A view registered with an engine.
pub struct ViewHandle<V> {
    view: Arc<V>,
    name: String,
    collection: String,
    registration: Registration,
}

impl<V> Clone for ViewHandle<V> {
    fn clone(&self) -> Self {
        Self {
            view: Arc::clone(&self.view),
            name: self.name.clone(),
            collection: self.collection.clone(),
            registration: self.registration,
        }
    }
}

impl<V: CollectionView> ViewHandle<V> {
    pub fn view(&self) -> &Arc<V> {
        &self.view
    }

    /// Persistent name of the materialized index.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether registration built a new index or reused an existing one.
    pub fn registration(&self) -> Registration {
        self.registration
    }

    /// Mappings of this view as of `snapshot`.
    pub fn mappings(&self, snapshot: &Snapshot) -> ViewResult<ViewMappings> {
        ViewMappings::from_snapshot(snapshot, &self.name, self.view.all_groups())
    }
}

/// Register `view` over `collection`, creating or reusing its materialized index.
pub fn register<V: CollectionView>(
    engine: &Engine,
    view: Arc<V>,
    collection: &str,
) -> ViewResult<ViewHandle<V>> {
    view.register_dependencies(engine, collection)?;
    let extension = ViewExtension::new(Arc::clone(&view), collection);
    let name = extension.name.clone();
    let registration = engine.register_extension(Arc::new(extension))?;
    Ok(ViewHandle {
        view,
        name,
        collection: collection.to_string(),
        registration,
    })
}
