use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};
use vellum_engine::{EventBus, StoreEvent};

use crate::error::{ObserveError, ObserveResult};
use crate::observer::ObserverCore;

/// Something the observation worker refreshes after each commit.
pub(crate) trait Observation: Send + Sync {
    fn core(&self) -> &ObserverCore;

    /// Roll forward and, if anything relevant changed, queue a delivery.
    fn process(self: Arc<Self>);

    /// Drop every listener.
    fn release(&self);
}

#[derive(Default)]
struct Passes {
    started: u64,
    completed: u64,
    stopped: bool,
}

/// Thread that holds the event-bus subscription and refreshes observers.
pub(crate) struct ObservationWorker {
    /// Engine whose events this worker acts on; others on a shared bus are ignored.
    store: u64,
    observers: Mutex<BTreeMap<u64, Arc<dyn Observation>>>,
    passes: Mutex<Passes>,
    idle: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ObservationWorker {
    pub fn start(bus: &EventBus, store: u64) -> ObserveResult<Arc<Self>> {
        let receiver = bus.subscribe();
        let worker = Arc::new(Self {
            store,
            observers: Mutex::new(BTreeMap::new()),
            passes: Mutex::new(Passes::default()),
            idle: Condvar::new(),
            thread: Mutex::new(None),
        });

        let runner = Arc::clone(&worker);
        let handle = thread::Builder::new()
            .name("vellum-observe".into())
            .spawn(move || runner.run(receiver))
            .map_err(|source| ObserveError::Spawn {
                thread: "observation",
                source,
            })?;
        *worker.thread.lock().expect("worker lock poisoned") = Some(handle);
        Ok(worker)
    }

    fn run(&self, mut receiver: broadcast::Receiver<StoreEvent>) {
        loop {
            match receiver.blocking_recv() {
                Ok(event) if event.store() != self.store => continue,
                Ok(StoreEvent::Modified { commit, .. }) => {
                    trace!(commit, "observation wake-up");
                    self.process_all();
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "observation worker lagged");
                    self.process_all();
                }
                Ok(StoreEvent::Closed { .. }) | Err(RecvError::Closed) => break,
            }
        }
        self.passes.lock().expect("worker lock poisoned").stopped = true;
        self.idle.notify_all();
        debug!("observation worker stopped");
    }

    fn process_all(&self) {
        self.passes.lock().expect("worker lock poisoned").started += 1;
        let observers: Vec<Arc<dyn Observation>> = self
            .observers
            .lock()
            .expect("worker lock poisoned")
            .values()
            .cloned()
            .collect();
        for observer in observers {
            observer.process();
        }
        self.passes.lock().expect("worker lock poisoned").completed += 1;
        self.idle.notify_all();
    }

    /// Wake the worker and block until a full pass that started after this
    /// call has finished. Returns at once if the worker has stopped.
    pub fn flush(&self, bus: &EventBus, commit: u64) {
        let target = {
            let passes = self.passes.lock().expect("worker lock poisoned");
            if passes.stopped {
                return;
            }
            passes.started + 1
        };
        bus.publish(StoreEvent::Modified {
            store: self.store,
            commit,
        });

        let mut passes = self.passes.lock().expect("worker lock poisoned");
        while passes.completed < target && !passes.stopped {
            passes = self.idle.wait(passes).expect("worker lock poisoned");
        }
    }

    pub fn register(&self, observation: Arc<dyn Observation>) {
        let id = observation.core().id();
        self.observers
            .lock()
            .expect("worker lock poisoned")
            .insert(id, observation);
    }

    pub fn unregister(&self, id: u64) -> bool {
        self.observers
            .lock()
            .expect("worker lock poisoned")
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.lock().expect("worker lock poisoned").len()
    }

    /// Wait for the thread to exit after a `Closed` event.
    pub fn join(&self) {
        let handle = self.thread.lock().expect("worker lock poisoned").take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        self.observers.lock().expect("worker lock poisoned").clear();
    }
}
