use std::cmp::Ordering;
use std::sync::Arc;

use vellum_engine::Engine;

use crate::error::ViewResult;
use crate::materialize::register;
use crate::view::{name_component, CollectionView};

/// A parent view narrowed by a secondary predicate.
///
/// The filtered index is derived from the parent's materialized index, so
/// changing `version_tag` rebuilds only the filtered index.
pub struct FilteredView<V, P> {
    parent: Arc<V>,
    predicate: P,
    version_tag: String,
}

impl<V, P> FilteredView<V, P>
where
    V: CollectionView,
    P: Fn(&str, &V::Object) -> bool + Send + Sync + 'static,
{
    pub fn new(parent: Arc<V>, version_tag: impl Into<String>, predicate: P) -> Self {
        Self {
            parent,
            predicate,
            version_tag: version_tag.into(),
        }
    }

    pub fn parent(&self) -> &Arc<V> {
        &self.parent
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }
}

impl<V, P> CollectionView for FilteredView<V, P>
where
    V: CollectionView,
    P: Fn(&str, &V::Object) -> bool + Send + Sync + 'static,
{
    type Object = V::Object;
    const VIEW_ID: &'static str = "filtered";
    const VERSION: u32 = 1;

    fn filter(&self, key: &str, object: &Self::Object) -> Option<String> {
        self.parent
            .filter(key, object)
            .filter(|_| (self.predicate)(key, object))
    }

    fn compare(&self, key1: &str, object1: &Self::Object, key2: &str, object2: &Self::Object) -> Ordering {
        self.parent.compare(key1, object1, key2, object2)
    }

    fn all_groups(&self) -> Vec<String> {
        self.parent.all_groups()
    }

    fn name(&self, collection: &str) -> String {
        format!(
            "{}_{}_{}_{}",
            self.parent.name(collection),
            Self::VIEW_ID,
            Self::VERSION,
            name_component(&self.version_tag)
        )
    }

    fn parent_name(&self, collection: &str) -> Option<String> {
        Some(self.parent.name(collection))
    }

    fn register_dependencies(&self, engine: &Engine, collection: &str) -> ViewResult<()> {
        register(engine, Arc::clone(&self.parent), collection).map(|_| ())
    }
}
