use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::diff::{RowChange, SectionChange};

/// Handle returned when a listener is added to an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Receives bracketed change notifications from a view observer.
///
/// Every method runs on the database's delivery thread. Observer accessors
/// already reflect the new state when `begin_updates` is called.
pub trait ViewListener: Send + Sync {
    fn begin_updates(&self) {}

    fn did_change_section(&self, _change: &SectionChange) {}

    fn did_change(&self, _change: &RowChange) {}

    fn end_updates(&self) {}
}

/// Ordered set of listeners of one observer.
pub(crate) struct Listeners<L: ?Sized> {
    next: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Listeners<L> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .expect("listeners lock poisoned")
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().expect("listeners lock poisoned");
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Listeners to invoke, cloned so no lock is held during callbacks.
    pub fn current(&self) -> Vec<Arc<L>> {
        self.entries
            .lock()
            .expect("listeners lock poisoned")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("listeners lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("listeners lock poisoned").len()
    }
}
