use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::worker::{Observation, ObservationWorker};

static NEXT_OBSERVER: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverState {
    /// Created but not yet registered with the observation worker.
    Initialized,
    /// Receiving updates.
    Active,
    /// Disposed; no further callbacks.
    Disposed,
    /// Stopped after an unrecoverable error.
    Failed,
}

/// Identity and lifecycle shared by every observer kind.
pub(crate) struct ObserverCore {
    id: u64,
    disposed: AtomicBool,
    state: Mutex<ObserverState>,
}

impl ObserverCore {
    pub fn new() -> Self {
        Self {
            id: NEXT_OBSERVER.fetch_add(1, Ordering::Relaxed),
            disposed: AtomicBool::new(false),
            state: Mutex::new(ObserverState::Initialized),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ObserverState {
        *self.state.lock().expect("observer lock poisoned")
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Whether the worker should still refresh this observer.
    pub fn is_live(&self) -> bool {
        !self.is_disposed() && self.state() == ObserverState::Active
    }

    pub fn activate(&self) {
        let mut state = self.state.lock().expect("observer lock poisoned");
        if *state == ObserverState::Initialized {
            *state = ObserverState::Active;
        }
    }

    pub fn fail(&self) {
        let mut state = self.state.lock().expect("observer lock poisoned");
        if *state != ObserverState::Disposed {
            *state = ObserverState::Failed;
        }
    }

    /// Flag the observer disposed. Returns `true` for the first call only.
    fn mark_disposed(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.state.lock().expect("observer lock poisoned") = ObserverState::Disposed;
        true
    }
}

/// Registration of one observer with the worker; disposes on drop.
pub(crate) struct Subscription {
    observation: Arc<dyn Observation>,
    worker: Arc<ObservationWorker>,
    dispatcher: Arc<Dispatcher>,
}

impl Subscription {
    pub fn new(
        observation: Arc<dyn Observation>,
        worker: Arc<ObservationWorker>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            observation,
            worker,
            dispatcher,
        }
    }

    pub fn id(&self) -> u64 {
        self.observation.core().id()
    }

    pub fn state(&self) -> ObserverState {
        self.observation.core().state()
    }

    /// Stop delivery. No callback runs after this returns, unless called from
    /// a callback, in which case the current delivery is the last one.
    pub fn dispose(&self) {
        let core = self.observation.core();
        if !core.mark_disposed() {
            return;
        }
        self.worker.unregister(core.id());
        self.observation.release();
        self.dispatcher.barrier();
        debug!(observer = core.id(), "observer disposed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
