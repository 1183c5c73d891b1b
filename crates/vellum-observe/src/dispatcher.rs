use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc as std_mpsc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{ObserveError, ObserveResult};

type Job = Box<dyn FnOnce() + Send>;

/// Single delivery thread shared by every observer of a database.
///
/// Jobs run in FIFO order. Listener callbacks only ever run here.
pub struct Dispatcher {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Dispatcher {
    pub fn start() -> ObserveResult<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = thread::Builder::new()
            .name("vellum-dispatch".into())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("listener panicked during delivery");
                    }
                }
                debug!("dispatcher stopped");
            })
            .map_err(|source| ObserveError::Spawn {
                thread: "dispatch",
                source,
            })?;

        Ok(Self {
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Queue a job. Returns `false` once the dispatcher is shut down.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let sender = self.sender.lock().expect("dispatcher lock poisoned");
        match sender.as_ref() {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Returns `true` when called from the dispatcher thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Block until every job queued before this call has run.
    ///
    /// Returns immediately on the dispatcher thread itself or after shutdown.
    pub fn barrier(&self) {
        if self.is_current() {
            return;
        }
        let (done, wait) = std_mpsc::sync_channel(1);
        if self.dispatch(move || {
            let _ = done.send(());
        }) {
            let _ = wait.recv();
        }
    }

    /// Stop accepting jobs, run the queued ones, and join the thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().expect("dispatcher lock poisoned").take());
        if self.is_current() {
            return;
        }
        let handle = self.thread.lock().expect("dispatcher lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
