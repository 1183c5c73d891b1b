use std::cmp::Ordering;

use vellum_codec::StorableObject;
use vellum_engine::Engine;

use crate::error::ViewResult;

/// Identifier of the view materialization scheme, part of every view name.
pub const VIEW_IMPL: &str = "vellum.view";

/// Version of the materialization scheme. Bumping it invalidates every
/// persisted view index.
pub const VIEW_IMPL_VERSION: u32 = 1;

/// Compose the persistent name of a view index.
///
/// Changing any component yields a different name, and therefore a freshly
/// built index. Text components carry their byte length so that no two
/// tuples share a name.
pub fn compose_name(
    view_id: &str,
    view_version: u32,
    collection: &str,
    type_id: &str,
    type_version: u32,
) -> String {
    format!(
        "{VIEW_IMPL}_{VIEW_IMPL_VERSION}_{}_{view_version}_{}_{}_{type_version}",
        name_component(view_id),
        name_component(collection),
        name_component(type_id),
    )
}

/// `len:text`, self-delimiting inside a composed name.
pub(crate) fn name_component(text: &str) -> String {
    format!("{}:{text}", text.len())
}

/// A grouped, sorted projection of one collection.
///
/// `filter` decides whether an object appears and in which group; `compare`
/// orders objects within a group. Ties left by `compare` are broken by key,
/// so the order is always total. `all_groups` fixes the order of sections.
pub trait CollectionView: Send + Sync + 'static {
    type Object: StorableObject;

    /// Stable identifier of the view type.
    const VIEW_ID: &'static str;

    /// Declared version. Bump it whenever `filter`, `compare` or
    /// `all_groups` change behavior.
    const VERSION: u32;

    /// Group of the object, or `None` to exclude it.
    fn filter(&self, key: &str, object: &Self::Object) -> Option<String>;

    fn compare(
        &self,
        key1: &str,
        object1: &Self::Object,
        key2: &str,
        object2: &Self::Object,
    ) -> Ordering;

    /// Every group the view can produce, in section order.
    fn all_groups(&self) -> Vec<String>;

    /// Persistent name of the view's index over `collection`.
    fn name(&self, collection: &str) -> String {
        compose_name(
            Self::VIEW_ID,
            Self::VERSION,
            collection,
            <Self::Object as StorableObject>::TYPE_ID,
            <Self::Object as StorableObject>::VERSION,
        )
    }

    /// Name of the view whose index this view's index is derived from.
    fn parent_name(&self, _collection: &str) -> Option<String> {
        None
    }

    /// Register every view this view depends on.
    fn register_dependencies(&self, _engine: &Engine, _collection: &str) -> ViewResult<()> {
        Ok(())
    }
}

/// `compare` with the key tie-break applied.
pub fn total_order<V: CollectionView + ?Sized>(
    view: &V,
    key1: &str,
    object1: &V::Object,
    key2: &str,
    object2: &V::Object,
) -> Ordering {
    view.compare(key1, object1, key2, object2)
        .then_with(|| key1.cmp(key2))
}
