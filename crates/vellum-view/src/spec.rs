use std::cmp::Ordering;

use vellum_codec::StorableObject;

use crate::flat::FLAT_GROUP;
use crate::view::{compose_name, CollectionView};

type FilterFn<T> = Box<dyn Fn(&str, &T) -> Option<String> + Send + Sync>;
type CompareFn<T> = Box<dyn Fn(&str, &T, &str, &T) -> Ordering + Send + Sync>;

/// A view assembled from closures instead of a trait implementation.
///
/// Without further configuration every object lands in the `"root"` group,
/// ordered by key.
pub struct ViewSpec<T> {
    id: String,
    version: u32,
    filter: FilterFn<T>,
    compare: CompareFn<T>,
    groups: Vec<String>,
}

impl<T: StorableObject> ViewSpec<T> {
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
            filter: Box::new(|_, _| Some(FLAT_GROUP.to_string())),
            compare: Box::new(|_, _, _, _| Ordering::Equal),
            groups: vec![FLAT_GROUP.to_string()],
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&str, &T) -> Option<String> + Send + Sync + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn with_compare(
        mut self,
        compare: impl Fn(&str, &T, &str, &T) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.compare = Box::new(compare);
        self
    }

    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

impl<T: StorableObject> CollectionView for ViewSpec<T> {
    type Object = T;
    const VIEW_ID: &'static str = "spec";
    const VERSION: u32 = 1;

    fn filter(&self, key: &str, object: &T) -> Option<String> {
        (self.filter)(key, object)
    }

    fn compare(&self, key1: &str, object1: &T, key2: &str, object2: &T) -> Ordering {
        (self.compare)(key1, object1, key2, object2)
    }

    fn all_groups(&self) -> Vec<String> {
        self.groups.clone()
    }

    fn name(&self, collection: &str) -> String {
        compose_name(
            &format!("{}.{}", Self::VIEW_ID, self.id),
            self.version,
            collection,
            T::TYPE_ID,
            T::VERSION,
        )
    }
}
