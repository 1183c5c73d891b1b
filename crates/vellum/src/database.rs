use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use vellum_codec::StorableObject;
use vellum_engine::{Engine, ReadTransaction, Registration, WriteTransaction};
use vellum_observe::{FlatViewObserver, ObservationHub, ViewObserver};
use vellum_view::{register, CollectionView, ViewHandle};

use crate::collection::Collection;
use crate::config::DatabaseConfig;
use crate::error::{VellumError, VellumResult};

type WriteJob = Box<dyn FnOnce(&Engine) + Send>;

/// Completion handle of an asynchronous write.
///
/// Await it from async code or call [`PendingWrite::wait`] from a plain
/// thread. Dropping it does not cancel the write.
#[must_use = "dropping a PendingWrite discards the write's result"]
pub struct PendingWrite<R> {
    receiver: oneshot::Receiver<VellumResult<R>>,
}

impl<R> PendingWrite<R> {
    fn rejected() -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(VellumError::Closed));
        Self { receiver }
    }

    /// Block until the write has committed (or failed).
    ///
    /// Must not be called from within an async runtime; `.await` instead.
    pub fn wait(self) -> VellumResult<R> {
        self.receiver.blocking_recv().unwrap_or(Err(VellumError::Closed))
    }
}

impl<R> Future for PendingWrite<R> {
    type Output = VellumResult<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(VellumError::Closed)))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Dedicated thread running queued writes in submission order.
struct WriteQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<WriteJob>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WriteQueue {
    fn start(engine: Engine) -> VellumResult<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WriteJob>();
        let handle = thread::Builder::new()
            .name("vellum-writer".into())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job(&engine);
                }
                debug!("write queue drained");
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(handle)),
        })
    }

    fn submit(&self, job: WriteJob) -> bool {
        let sender = self.sender.lock().expect("write queue lock poisoned");
        sender.as_ref().is_some_and(|s| s.send(job).is_ok())
    }

    /// Stop accepting writes and wait for the queued ones.
    fn shutdown(&self) {
        drop(self.sender.lock().expect("write queue lock poisoned").take());
        let handle = self.thread.lock().expect("write queue lock poisoned").take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

struct DatabaseInner {
    engine: Engine,
    config: DatabaseConfig,
    hub: ObservationHub,
    writes: WriteQueue,
    closed: AtomicBool,
}

impl DatabaseInner {
    fn close(&self) -> VellumResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.writes.shutdown();
        self.hub.flush();
        self.hub.shutdown();
        if self.config.prune_orphaned_views {
            self.engine.drop_orphaned_extensions();
        }
        self.engine.close()?;
        info!(path = ?self.engine.path(), "database closed");
        Ok(())
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(%err, "failed to close database");
        }
    }
}

/// An open Vellum database.
///
/// Cloning yields another handle to the same database. The database closes
/// when [`Database::close`] is called or the last handle is dropped.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open (or create) a persistent database in the directory `path`.
    pub fn open(path: impl AsRef<Path>, config: DatabaseConfig) -> VellumResult<Self> {
        let engine = Engine::open(path.as_ref(), config.engine.clone())?;
        Self::from_engine(engine, config)
    }

    /// Create a database that lives only in memory.
    pub fn in_memory(config: DatabaseConfig) -> VellumResult<Self> {
        let engine = Engine::in_memory(config.engine.clone())?;
        Self::from_engine(engine, config)
    }

    /// Wrap an already opened engine.
    pub fn from_engine(engine: Engine, config: DatabaseConfig) -> VellumResult<Self> {
        let hub = ObservationHub::start(engine.clone())?;
        let writes = WriteQueue::start(engine.clone())?;
        info!(
            path = ?engine.path(),
            commit = engine.commit(),
            views = engine.persisted_extensions().len(),
            "database opened"
        );
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                engine,
                config,
                hub,
                writes,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.engine.path()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Latest committed commit number.
    pub fn commit(&self) -> u64 {
        self.inner.engine.commit()
    }

    /// Typed handle to the collection `name`.
    pub fn collection<T: StorableObject>(&self, name: &str) -> Collection<T> {
        Collection::new(self.clone(), name)
    }

    /// Names of collections holding at least one record.
    pub fn collections(&self) -> Vec<String> {
        self.inner
            .engine
            .read(|tx| tx.collections().map(str::to_string).collect())
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadTransaction) -> R) -> R {
        self.inner.engine.read(f)
    }

    /// Run `f` as a read-write transaction on the calling thread.
    pub fn write<R>(&self, f: impl FnOnce(&mut WriteTransaction) -> VellumResult<R>) -> VellumResult<R> {
        self.ensure_open()?;
        self.inner.engine.write(f)
    }

    /// Queue `f` on the writer thread.
    ///
    /// Queued writes commit in submission order. A failed write is logged
    /// and reported through the returned handle.
    pub fn write_async<R, F>(&self, f: F) -> PendingWrite<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut WriteTransaction) -> VellumResult<R> + Send + 'static,
    {
        if self.is_closed() {
            return PendingWrite::rejected();
        }
        let (sender, receiver) = oneshot::channel();
        let job: WriteJob = Box::new(move |engine: &Engine| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| engine.write(f)))
                .unwrap_or_else(|payload| Err(VellumError::WritePanicked(panic_message(&*payload))));
            if let Err(err) = &result {
                error!(%err, "queued write failed");
            }
            let _ = sender.send(result);
        });
        if !self.inner.writes.submit(job) {
            return PendingWrite::rejected();
        }
        PendingWrite { receiver }
    }

    /// Register `view` over `collection`, reusing its persisted index when
    /// the view's name is unchanged.
    pub fn register_view<V: CollectionView>(
        &self,
        view: Arc<V>,
        collection: &str,
    ) -> VellumResult<ViewHandle<V>> {
        self.ensure_open()?;
        let handle = register(&self.inner.engine, view, collection)?;
        if handle.registration() == Registration::Built {
            debug!(view = handle.name(), collection, "view index built");
        }
        Ok(handle)
    }

    pub fn observe_view<V: CollectionView>(&self, handle: &ViewHandle<V>) -> VellumResult<ViewObserver<V>> {
        self.ensure_open()?;
        Ok(self.inner.hub.observe_view(handle.clone())?)
    }

    pub fn observe_flat<V: CollectionView>(
        &self,
        handle: &ViewHandle<V>,
    ) -> VellumResult<FlatViewObserver<V>> {
        self.ensure_open()?;
        Ok(self.inner.hub.observe_flat(handle.clone())?)
    }

    /// Views registered in this session.
    pub fn registered_views(&self) -> Vec<String> {
        self.inner.engine.registered_extensions()
    }

    /// Every materialized view index in the store.
    pub fn persisted_views(&self) -> Vec<String> {
        self.inner.engine.persisted_extensions()
    }

    /// Forget persisted view indices not registered in this session.
    pub fn prune_orphaned_views(&self) -> Vec<String> {
        self.inner.engine.drop_orphaned_extensions()
    }

    pub fn checkpoint(&self) -> VellumResult<()> {
        Ok(self.inner.engine.checkpoint()?)
    }

    /// Wait until queued writes have committed and every observer has
    /// delivered the resulting updates.
    pub fn flush(&self) -> VellumResult<()> {
        self.write_async(|_| Ok(())).wait()?;
        self.inner.hub.flush();
        Ok(())
    }

    /// Drain queued writes, stop observers, and checkpoint.
    ///
    /// Idempotent; also runs when the last handle is dropped.
    pub fn close(&self) -> VellumResult<()> {
        self.inner.close()
    }

    pub(crate) fn hub(&self) -> &ObservationHub {
        &self.inner.hub
    }

    pub(crate) fn ensure_open(&self) -> VellumResult<()> {
        if self.is_closed() {
            return Err(VellumError::Closed);
        }
        Ok(())
    }
}
