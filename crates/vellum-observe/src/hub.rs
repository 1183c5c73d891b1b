use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use vellum_codec::StorableObject;
use vellum_engine::{Engine, StoreEvent};
use vellum_view::{CollectionView, ViewHandle};

use crate::collection::CollectionObserver;
use crate::dispatcher::Dispatcher;
use crate::error::{ObserveError, ObserveResult};
use crate::flat::FlatViewObserver;
use crate::object::ObjectObserver;
use crate::observer::Subscription;
use crate::view::ViewObserver;
use crate::worker::{Observation, ObservationWorker};

/// Per-database observation runtime: one worker thread refreshing
/// observers after each commit and one dispatcher thread delivering results.
pub struct ObservationHub {
    engine: Engine,
    dispatcher: Arc<Dispatcher>,
    worker: Arc<ObservationWorker>,
    closed: AtomicBool,
}

impl ObservationHub {
    /// Subscribe to `engine`'s event bus and start both threads.
    pub fn start(engine: Engine) -> ObserveResult<Self> {
        let worker = ObservationWorker::start(engine.event_bus(), engine.store_id())?;
        let dispatcher = match Dispatcher::start() {
            Ok(dispatcher) => Arc::new(dispatcher),
            Err(err) => {
                engine.event_bus().publish(StoreEvent::Closed {
                    store: engine.store_id(),
                });
                worker.join();
                return Err(err);
            }
        };
        info!(commit = engine.commit(), "observation hub started");
        Ok(Self {
            engine,
            dispatcher,
            worker,
            closed: AtomicBool::new(false),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of observers currently registered.
    pub fn observer_count(&self) -> usize {
        self.worker.len()
    }

    /// Returns `true` when called from the delivery thread.
    pub fn is_delivery_thread(&self) -> bool {
        self.dispatcher.is_current()
    }

    /// Observe the object stored under `key`.
    pub fn observe_key<T: StorableObject>(
        &self,
        collection: &str,
        key: &str,
    ) -> ObserveResult<ObjectObserver<T>> {
        ObjectObserver::open(self, collection, key)
    }

    /// Observe every readable object of a collection.
    pub fn observe_collection<T: StorableObject>(
        &self,
        collection: &str,
    ) -> ObserveResult<CollectionObserver<T>> {
        CollectionObserver::open(self, collection)
    }

    /// Observe a registered view.
    pub fn observe_view<V: CollectionView>(
        &self,
        handle: ViewHandle<V>,
    ) -> ObserveResult<ViewObserver<V>> {
        ViewObserver::open(self, handle)
    }

    /// Observe a registered view as one flat list.
    pub fn observe_flat<V: CollectionView>(
        &self,
        handle: ViewHandle<V>,
    ) -> ObserveResult<FlatViewObserver<V>> {
        Ok(FlatViewObserver::new(ViewObserver::open(self, handle)?))
    }

    /// Block until every observer has caught up with the latest commit and
    /// the resulting deliveries have run.
    pub fn flush(&self) {
        if self.is_closed() {
            return;
        }
        self.worker.flush(self.engine.event_bus(), self.engine.commit());
        self.dispatcher.barrier();
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn ensure_open(&self) -> ObserveResult<()> {
        if self.is_closed() {
            return Err(ObserveError::Closed);
        }
        Ok(())
    }

    /// Register an observer whose connection is pinned at `pinned`.
    pub(crate) fn enroll(
        &self,
        observation: Arc<dyn Observation>,
        pinned: u64,
    ) -> ObserveResult<Subscription> {
        self.ensure_open()?;
        let id = observation.core().id();
        observation.core().activate();
        self.worker.register(Arc::clone(&observation));

        // Commits published before registration may already have been
        // consumed by the worker.
        let latest = self.engine.commit();
        if pinned < latest {
            self.engine.event_bus().publish(StoreEvent::Modified {
                store: self.engine.store_id(),
                commit: latest,
            });
        }

        debug!(observer = id, pinned, "observer registered");
        Ok(Subscription::new(
            observation,
            Arc::clone(&self.worker),
            Arc::clone(&self.dispatcher),
        ))
    }

    /// Stop the worker, run pending deliveries, and stop the dispatcher.
    ///
    /// Observers stay usable as read-only handles but receive no updates.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.engine.event_bus().publish(StoreEvent::Closed {
            store: self.engine.store_id(),
        });
        self.worker.join();
        self.dispatcher.shutdown();
        info!("observation hub shut down");
    }
}

impl Drop for ObservationHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
