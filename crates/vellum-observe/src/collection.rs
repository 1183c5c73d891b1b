use std::sync::{Arc, Mutex};

use tracing::debug;
use vellum_codec::StorableObject;
use vellum_collection::CollectionReadTransaction;
use vellum_engine::LongLivedConnection;

use crate::dispatcher::Dispatcher;
use crate::error::ObserveResult;
use crate::hub::ObservationHub;
use crate::listener::{ListenerId, Listeners};
use crate::observer::{ObserverCore, ObserverState, Subscription};
use crate::worker::Observation;

type Entries<T> = Vec<(String, T)>;
type EntriesListener<T> = dyn Fn(&[(String, T)]) + Send + Sync;

struct CollectionInner<T> {
    core: ObserverCore,
    dispatcher: Arc<Dispatcher>,
    collection: String,
    connection: Mutex<LongLivedConnection>,
    presented: Mutex<Arc<Entries<T>>>,
    listeners: Listeners<EntriesListener<T>>,
}

impl<T: StorableObject> CollectionInner<T> {
    fn deliver(&self, entries: Arc<Entries<T>>) {
        if self.core.is_disposed() {
            return;
        }
        *self.presented.lock().expect("observer lock poisoned") = Arc::clone(&entries);
        let listeners = self.listeners.current();
        for listener in &listeners {
            listener(entries.as_slice());
        }
        debug!(
            observer = self.core.id(),
            collection = %self.collection,
            objects = entries.len(),
            listeners = listeners.len(),
            "collection update delivered"
        );
    }
}

impl<T: StorableObject> Observation for CollectionInner<T> {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn process(self: Arc<Self>) {
        if !self.core.is_live() {
            return;
        }
        let (changes, snapshot) = {
            let mut connection = self.connection.lock().expect("observer lock poisoned");
            let changes = connection.roll_forward();
            (changes, Arc::clone(connection.snapshot()))
        };
        if !changes.iter().any(|cs| cs.touches_collection(&self.collection)) {
            return;
        }

        let entries = Arc::new(CollectionReadTransaction::<T>::new(&snapshot, &self.collection).objects());
        let inner = Arc::clone(&self);
        self.dispatcher.dispatch(move || inner.deliver(entries));
    }

    fn release(&self) {
        self.listeners.clear();
    }
}

/// Live contents of a whole collection, in key order.
pub struct CollectionObserver<T: StorableObject> {
    inner: Arc<CollectionInner<T>>,
    subscription: Subscription,
}

impl<T: StorableObject> CollectionObserver<T> {
    pub(crate) fn open(hub: &ObservationHub, collection: &str) -> ObserveResult<Self> {
        hub.ensure_open()?;
        let connection = hub.engine().connect_long_lived();
        let pinned = connection.commit();
        let initial = CollectionReadTransaction::<T>::new(connection.snapshot(), collection).objects();

        let inner = Arc::new(CollectionInner {
            core: ObserverCore::new(),
            dispatcher: Arc::clone(hub.dispatcher()),
            collection: collection.to_string(),
            connection: Mutex::new(connection),
            presented: Mutex::new(Arc::new(initial)),
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

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// The most recently delivered `(key, object)` pairs.
    pub fn objects(&self) -> Arc<Vec<(String, T)>> {
        Arc::clone(&self.inner.presented.lock().expect("observer lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_listener(&self, listener: impl Fn(&[(String, T)]) + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn dispose(&self) {
        self.subscription.dispose();
    }
}
