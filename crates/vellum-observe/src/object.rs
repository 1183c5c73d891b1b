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

type ValueListener<T> = dyn Fn(&Option<T>) + Send + Sync;

struct ObjectInner<T> {
    core: ObserverCore,
    dispatcher: Arc<Dispatcher>,
    collection: String,
    key: String,
    connection: Mutex<LongLivedConnection>,
    presented: Mutex<Arc<Option<T>>>,
    listeners: Listeners<ValueListener<T>>,
}

impl<T: StorableObject> ObjectInner<T> {
    fn deliver(&self, value: Arc<Option<T>>) {
        if self.core.is_disposed() {
            return;
        }
        *self.presented.lock().expect("observer lock poisoned") = Arc::clone(&value);
        let listeners = self.listeners.current();
        for listener in &listeners {
            listener(&*value);
        }
        debug!(
            observer = self.core.id(),
            collection = %self.collection,
            key = %self.key,
            present = value.is_some(),
            listeners = listeners.len(),
            "object update delivered"
        );
    }
}

impl<T: StorableObject> Observation for ObjectInner<T> {
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
        if !changes
            .iter()
            .any(|cs| cs.touches_key(&self.collection, &self.key))
        {
            return;
        }

        let value = Arc::new(CollectionReadTransaction::<T>::new(&snapshot, &self.collection).get(&self.key));
        let inner = Arc::clone(&self);
        self.dispatcher.dispatch(move || inner.deliver(value));
    }

    fn release(&self) {
        self.listeners.clear();
    }
}

/// Live value of one key.
///
/// Listeners receive the full current value, `None` once the key is removed
/// or holds an unreadable record, each time a commit touches the key.
pub struct ObjectObserver<T: StorableObject> {
    inner: Arc<ObjectInner<T>>,
    subscription: Subscription,
}

impl<T: StorableObject> ObjectObserver<T> {
    pub(crate) fn open(hub: &ObservationHub, collection: &str, key: &str) -> ObserveResult<Self> {
        hub.ensure_open()?;
        let connection = hub.engine().connect_long_lived();
        let pinned = connection.commit();
        let initial = CollectionReadTransaction::<T>::new(connection.snapshot(), collection).get(key);

        let inner = Arc::new(ObjectInner {
            core: ObserverCore::new(),
            dispatcher: Arc::clone(hub.dispatcher()),
            collection: collection.to_string(),
            key: key.to_string(),
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

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The most recently delivered value.
    pub fn value(&self) -> Arc<Option<T>> {
        Arc::clone(&self.inner.presented.lock().expect("observer lock poisoned"))
    }

    pub fn add_listener(&self, listener: impl Fn(&Option<T>) + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Stop delivery; idempotent. Also runs on drop.
    pub fn dispose(&self) {
        self.subscription.dispose();
    }
}

impl<T: StorableObject + Clone> ObjectObserver<T> {
    pub fn get(&self) -> Option<T> {
        (*self.value()).clone()
    }
}
