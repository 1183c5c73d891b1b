use tokio::sync::broadcast;
use tracing::trace;

/// Notification published by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// A write transaction committed in `store`.
    Modified { store: u64, commit: u64 },
    /// `store` is shutting down; its receivers should stop.
    Closed { store: u64 },
}

impl StoreEvent {
    /// Id of the engine that published the event.
    pub fn store(&self) -> u64 {
        match *self {
            StoreEvent::Modified { store, .. } | StoreEvent::Closed { store } => store,
        }
    }
}

/// Broadcast channel carrying [`StoreEvent`]s.
///
/// Several engines may publish on one bus, so every event names the store
/// it came from. Events carry no data beyond that and the commit number;
/// receivers that lag simply treat the lag as a wake-up and read the commit
/// log themselves.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no receivers is not an error.
    pub fn publish(&self, event: StoreEvent) {
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(?event, receivers, "store event published");
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
