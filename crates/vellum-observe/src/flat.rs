use std::sync::Arc;

use vellum_collection::CollectionReadTransaction;
use vellum_view::CollectionView;

use crate::listener::{ListenerId, ViewListener};
use crate::observer::ObserverState;
use crate::view::ViewObserver;

/// A view observer read as one list, sections concatenated in order.
///
/// Meant for single-group views such as [`FlatView`](vellum_view::FlatView),
/// where flat indices equal row indices of section 0.
pub struct FlatViewObserver<V: CollectionView> {
    view: ViewObserver<V>,
}

impl<V: CollectionView> FlatViewObserver<V> {
    pub(crate) fn new(view: ViewObserver<V>) -> Self {
        Self { view }
    }

    /// The underlying sectioned observer.
    pub fn view(&self) -> &ViewObserver<V> {
        &self.view
    }

    pub fn state(&self) -> ObserverState {
        self.view.state()
    }

    pub fn number_of_objects(&self) -> usize {
        self.view.mappings().total_items()
    }

    pub fn key_at(&self, index: usize) -> Option<String> {
        let mappings = self.view.mappings();
        mappings
            .sections()
            .iter()
            .flat_map(|group| mappings.keys_in_group(group))
            .nth(index)
            .cloned()
    }

    pub fn object_at(&self, index: usize) -> Option<V::Object> {
        let (mappings, snapshot) = self.view.presented();
        let key = mappings
            .sections()
            .iter()
            .flat_map(|group| mappings.keys_in_group(group))
            .nth(index)?;
        CollectionReadTransaction::<V::Object>::new(&snapshot, self.view.handle().collection()).get(key)
    }

    /// Every presented object in order.
    pub fn all_objects(&self) -> Vec<(String, V::Object)> {
        let (mappings, snapshot) = self.view.presented();
        let reader = CollectionReadTransaction::<V::Object>::new(&snapshot, self.view.handle().collection());
        mappings
            .sections()
            .iter()
            .flat_map(|group| mappings.keys_in_group(group))
            .filter_map(|key| reader.get(key).map(|object| (key.clone(), object)))
            .collect()
    }

    pub fn add_listener<L: ViewListener + 'static>(&self, listener: Arc<L>) -> ListenerId {
        self.view.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.view.remove_listener(id)
    }

    pub fn dispose(&self) {
        self.view.dispose();
    }
}
