use std::sync::{Arc, Mutex};

use tracing::{debug, error};
use vellum_collection::CollectionReadTransaction;
use vellum_engine::{LongLivedConnection, Snapshot};
use vellum_view::{CollectionView, IndexPath, ViewHandle, ViewMappings};

use crate::diff::{self, ViewUpdate};
use crate::dispatcher::Dispatcher;
use crate::error::ObserveResult;
use crate::hub::ObservationHub;
use crate::listener::{ListenerId, Listeners, ViewListener};
use crate::observer::{ObserverCore, ObserverState, Subscription};
use crate::worker::Observation;

/// Worker-side state: where the observer is pinned and what it last diffed.
struct Tracking {
    connection: LongLivedConnection,
    before: Arc<ViewMappings>,
}

/// What accessors report: swapped on the dispatcher before listeners run.
struct Presented {
    mappings: Arc<ViewMappings>,
    snapshot: Arc<Snapshot>,
}

struct ViewInner<V: CollectionView> {
    core: ObserverCore,
    dispatcher: Arc<Dispatcher>,
    handle: ViewHandle<V>,
    tracking: Mutex<Tracking>,
    presented: Mutex<Presented>,
    listeners: Listeners<dyn ViewListener>,
}

impl<V: CollectionView> ViewInner<V> {
    fn deliver(&self, mappings: Arc<ViewMappings>, snapshot: Arc<Snapshot>, update: ViewUpdate) {
        if self.core.is_disposed() {
            return;
        }
        *self.presented.lock().expect("observer lock poisoned") = Presented { mappings, snapshot };

        let listeners = self.listeners.current();
        for listener in &listeners {
            listener.begin_updates();
            for change in &update.sections {
                listener.did_change_section(change);
            }
            for change in &update.rows {
                listener.did_change(change);
            }
            listener.end_updates();
        }
        debug!(
            observer = self.core.id(),
            view = self.handle.name(),
            sections = update.sections.len(),
            rows = update.rows.len(),
            listeners = listeners.len(),
            "view update delivered"
        );
    }

    fn presented(&self) -> (Arc<ViewMappings>, Arc<Snapshot>) {
        let presented = self.presented.lock().expect("observer lock poisoned");
        (Arc::clone(&presented.mappings), Arc::clone(&presented.snapshot))
    }
}

impl<V: CollectionView> Observation for ViewInner<V> {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn process(self: Arc<Self>) {
        if !self.core.is_live() {
            return;
        }
        let collection = self.handle.collection();
        let mut tracking = self.tracking.lock().expect("observer lock poisoned");
        let changes = tracking.connection.roll_forward();
        if !changes.iter().any(|cs| cs.touches_collection(collection)) {
            return;
        }

        let snapshot = Arc::clone(tracking.connection.snapshot());
        let after = match self.handle.mappings(&snapshot) {
            Ok(mappings) => Arc::new(mappings),
            Err(err) => {
                self.core.fail();
                error!(
                    observer = self.core.id(),
                    view = self.handle.name(),
                    commit = snapshot.commit(),
                    %err,
                    "view observer failed"
                );
                return;
            }
        };

        let update = diff::compute(&tracking.before, &after, |key| {
            changes.iter().any(|cs| cs.touches_key(collection, key))
        });
        tracking.before = Arc::clone(&after);
        drop(tracking);

        if update.is_empty() {
            return;
        }
        let inner = Arc::clone(&self);
        self.dispatcher
            .dispatch(move || inner.deliver(after, snapshot, update));
    }

    fn release(&self) {
        self.listeners.clear();
    }
}

/// Live, grouped and sorted contents of a registered view.
///
/// Accessors describe the state listeners were last told about; inside a
/// callback they already reflect the update being delivered.
pub struct ViewObserver<V: CollectionView> {
    inner: Arc<ViewInner<V>>,
    subscription: Subscription,
}

impl<V: CollectionView> ViewObserver<V> {
    pub(crate) fn open(hub: &ObservationHub, handle: ViewHandle<V>) -> ObserveResult<Self> {
        hub.ensure_open()?;
        let connection = hub.engine().connect_long_lived();
        let pinned = connection.commit();
        let snapshot = Arc::clone(connection.snapshot());
        let mappings = Arc::new(handle.mappings(&snapshot)?);

        let inner = Arc::new(ViewInner {
            core: ObserverCore::new(),
            dispatcher: Arc::clone(hub.dispatcher()),
            handle,
            tracking: Mutex::new(Tracking {
                connection,
                before: Arc::clone(&mappings),
            }),
            presented: Mutex::new(Presented { mappings, snapshot }),
            listeners: Listeners::new(),
        });
        let subscription = hub.enroll(inner.clone(), pinned)?;
        Ok(Self { inner, subscription })
    }

    pub fn id(&self) -> u64 {
        self.subscription.id()
    }

    pub fn state(&self) -> ObserverState {
        self.subscription.state()
    }

    pub fn handle(&self) -> &ViewHandle<V> {
        &self.inner.handle
    }

    pub fn add_listener<L: ViewListener + 'static>(&self, listener: Arc<L>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Stop delivery; idempotent. Also runs on drop.
    pub fn dispose(&self) {
        self.subscription.dispose();
    }

    /// Presented mappings.
    pub fn mappings(&self) -> Arc<ViewMappings> {
        self.inner.presented().0
    }

    /// Commit of the presented state.
    pub fn commit(&self) -> u64 {
        self.inner.presented().1.commit()
    }

    pub fn number_of_groups(&self) -> usize {
        self.mappings().number_of_groups()
    }

    pub fn number_of_sections(&self) -> usize {
        self.mappings().number_of_sections()
    }

    pub fn number_of_items(&self, section: usize) -> usize {
        self.mappings().number_of_items(section)
    }

    pub fn group_for_section(&self, section: usize) -> Option<String> {
        self.mappings().group_for_section(section).map(str::to_string)
    }

    pub fn key_at(&self, section: usize, index: usize) -> Option<String> {
        self.mappings().item_at(section, index).map(str::to_string)
    }

    pub fn index_path_of(&self, key: &str) -> Option<IndexPath> {
        self.mappings().index_path_of(key)
    }

    pub fn object_at(&self, section: usize, index: usize) -> Option<V::Object> {
        let (mappings, snapshot) = self.inner.presented();
        let key = mappings.item_at(section, index)?;
        CollectionReadTransaction::<V::Object>::new(&snapshot, self.inner.handle.collection()).get(key)
    }

    /// Objects of one section, in view order.
    pub fn objects_in_section(&self, section: usize) -> Vec<(String, V::Object)> {
        let (mappings, snapshot) = self.inner.presented();
        let reader = CollectionReadTransaction::<V::Object>::new(&snapshot, self.inner.handle.collection());
        mappings
            .keys_in_section(section)
            .iter()
            .filter_map(|key| reader.get(key).map(|object| (key.clone(), object)))
            .collect()
    }

    pub(crate) fn presented(&self) -> (Arc<ViewMappings>, Arc<Snapshot>) {
        self.inner.presented()
    }
}
