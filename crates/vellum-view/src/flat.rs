use std::cmp::Ordering;

use vellum_codec::StorableObject;

use crate::view::{compose_name, CollectionView};

/// Group holding every item of a [`FlatView`].
pub const FLAT_GROUP: &str = "root";

type Predicate<T> = Box<dyn Fn(&str, &T) -> bool + Send + Sync>;

/// A single-group view: every accepted object, in comparator order.
pub struct FlatView<T, C> {
    id: String,
    version: u32,
    compare: C,
    predicate: Option<Predicate<T>>,
}

impl<T, C> FlatView<T, C>
where
    T: StorableObject,
    C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
{
    /// `id` and `version` identify the view's persistent index.
    pub fn new(id: impl Into<String>, version: u32, compare: C) -> Self {
        Self {
            id: id.into(),
            version,
            compare,
            predicate: None,
        }
    }

    /// Only include objects for which `predicate` holds.
    pub fn with_predicate(mut self, predicate: impl Fn(&str, &T) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }
}

impl<T, C> CollectionView for FlatView<T, C>
where
    T: StorableObject,
    C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
{
    type Object = T;
    const VIEW_ID: &'static str = "flat";
    const VERSION: u32 = 1;

    fn filter(&self, key: &str, object: &T) -> Option<String> {
        match &self.predicate {
            Some(predicate) if !predicate(key, object) => None,
            _ => Some(FLAT_GROUP.to_string()),
        }
    }

    fn compare(&self, _key1: &str, object1: &T, _key2: &str, object2: &T) -> Ordering {
        (self.compare)(object1, object2)
    }

    fn all_groups(&self) -> Vec<String> {
        vec![FLAT_GROUP.to_string()]
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
