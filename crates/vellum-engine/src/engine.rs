use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, StoreEvent};
use crate::change::ChangeSet;
use crate::checkpoint::{CheckpointFile, PersistedIndex};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::extension::{Extension, ExtensionIndex, Registration};
use crate::snapshot::Snapshot;
use crate::transaction::{apply_op, ReadTransaction, WriteTransaction};
use crate::wal::{CommitRecord, WriteAheadLog};

/// File name of the write-ahead log inside a store directory.
pub const WAL_FILE: &str = "store.wal";
/// File name of the checkpoint inside a store directory.
pub const CHECKPOINT_FILE: &str = "store.checkpoint";

/// Where an engine keeps its data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    Directory(PathBuf),
}

struct StorePaths {
    dir: PathBuf,
    checkpoint: PathBuf,
}

struct Published {
    snapshot: Arc<Snapshot>,
    /// Change sets not yet consumed by every long-lived connection.
    log: VecDeque<Arc<ChangeSet>>,
}

/// State only the writer touches. Holding this mutex is the write gate.
struct WriterState {
    registry: Vec<Arc<dyn Extension>>,
    /// Persisted indices whose extension has not been registered this session.
    dormant: BTreeMap<String, PersistedIndex>,
    wal: Option<WriteAheadLog>,
    commits_since_checkpoint: u64,
}

static NEXT_STORE: AtomicU64 = AtomicU64::new(1);

struct EngineInner {
    /// Process-unique id stamped on every event this engine publishes.
    store: u64,
    paths: Option<StorePaths>,
    config: EngineConfig,
    published: RwLock<Published>,
    /// Long-lived connection id -> commit it is pinned to.
    pins: Mutex<BTreeMap<u64, u64>>,
    next_connection: AtomicU64,
    writer: Mutex<WriterState>,
    bus: EventBus,
}

/// Embedded single-writer, multi-reader key-value engine.
///
/// Cloning an `Engine` yields another handle to the same store.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Open (or create) a persistent store in the directory `path`.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let bus = EventBus::new(config.event_capacity);
        Self::with_event_bus(StoreLocation::Directory(path.as_ref().to_path_buf()), config, bus)
    }

    /// Create a store that lives only as long as its handles.
    pub fn in_memory(config: EngineConfig) -> EngineResult<Self> {
        let bus = EventBus::new(config.event_capacity);
        Self::with_event_bus(StoreLocation::InMemory, config, bus)
    }

    /// Create an engine that publishes on a caller-supplied bus.
    pub fn with_event_bus(
        location: StoreLocation,
        config: EngineConfig,
        bus: EventBus,
    ) -> EngineResult<Self> {
        let (paths, wal, snapshot, dormant, replayed) = match location {
            StoreLocation::InMemory => {
                debug!("in-memory store created");
                (None, None, Snapshot::default(), BTreeMap::new(), 0)
            }
            StoreLocation::Directory(dir) => {
                let (paths, wal, snapshot, dormant, replayed) = recover(dir, &config)?;
                (Some(paths), Some(wal), snapshot, dormant, replayed)
            }
        };

        let inner = EngineInner {
            store: NEXT_STORE.fetch_add(1, Ordering::Relaxed),
            paths,
            config,
            published: RwLock::new(Published {
                snapshot: Arc::new(snapshot),
                log: VecDeque::new(),
            }),
            pins: Mutex::new(BTreeMap::new()),
            next_connection: AtomicU64::new(1),
            writer: Mutex::new(WriterState {
                registry: Vec::new(),
                dormant,
                wal,
                commits_since_checkpoint: replayed,
            }),
            bus,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Directory backing the store, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.inner.paths.as_ref().map(|p| p.dir.as_path())
    }

    /// Id carried by this engine's [`StoreEvent`]s.
    pub fn store_id(&self) -> u64 {
        self.inner.store
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.paths.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.current()
    }

    /// Latest committed commit number.
    pub fn commit(&self) -> u64 {
        self.inner.current().commit()
    }

    /// Run `f` against the latest snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&ReadTransaction) -> R) -> R {
        let snapshot = self.inner.current();
        f(&snapshot)
    }

    /// Run `f` as a read-write transaction.
    ///
    /// Writers are serialized. The transaction commits when `f` returns `Ok`
    /// and touched at least one key; an `Err` discards every mutation. All
    /// registered extensions are maintained before the commit is published.
    pub fn write<R, E>(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<EngineError>,
    {
        let mut writer = self.inner.gate();
        let mut tx = WriteTransaction::new(Snapshot::clone(&self.inner.current()));
        let result = f(&mut tx)?;
        if tx.is_empty() {
            return Ok(result);
        }
        self.inner.commit(&mut writer, tx)?;
        Ok(result)
    }

    /// Receive [`StoreEvent`]s published by this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Open a connection pinned to the latest commit.
    ///
    /// The commit log retains every change set the connection has not yet
    /// rolled past.
    pub fn connect_long_lived(&self) -> LongLivedConnection {
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let published = self.inner.published.read().expect("published lock poisoned");
        let snapshot = Arc::clone(&published.snapshot);
        self.inner
            .pins
            .lock()
            .expect("pins lock poisoned")
            .insert(id, snapshot.commit());
        drop(published);

        debug!(connection = id, commit = snapshot.commit(), "long-lived connection opened");
        LongLivedConnection {
            inner: Arc::clone(&self.inner),
            id,
            snapshot,
        }
    }

    /// Register a materialized index.
    ///
    /// An extension already active, or persisted under the same name, is
    /// reused (catching up on keys written while it was not maintained);
    /// otherwise its index is populated from the current snapshot. The
    /// extension's dependencies must be registered first.
    pub fn register_extension(&self, extension: Arc<dyn Extension>) -> EngineResult<Registration> {
        let mut writer = self.inner.gate();
        let name = extension.name().to_string();

        if writer.registry.iter().any(|e| e.name() == name) {
            debug!(extension = %name, "extension already registered");
            return Ok(Registration::Reused);
        }
        for dependency in extension.dependencies() {
            if !writer.registry.iter().any(|e| e.name() == dependency) {
                return Err(EngineError::MissingDependency { name, dependency });
            }
        }

        let mut snapshot = Snapshot::clone(&self.inner.current());
        let (index, registration) = match writer.dormant.get(&name) {
            Some(persisted) if persisted.collection == extension.collection() => {
                let index = if persisted.cleared {
                    extension.populate(&snapshot)?
                } else {
                    let mut index = persisted.index.clone();
                    extension.update(&mut index, &snapshot, &persisted.stale_keys)?;
                    index
                };
                (index, Registration::Reused)
            }
            _ => (extension.populate(&snapshot)?, Registration::Built),
        };
        writer.dormant.remove(&name);

        info!(
            extension = %name,
            collection = extension.collection(),
            items = index.len(),
            ?registration,
            "extension registered"
        );

        snapshot.extensions.insert(name, Arc::new(index));
        writer.registry.push(extension);
        self.inner
            .published
            .write()
            .expect("published lock poisoned")
            .snapshot = Arc::new(snapshot);
        Ok(registration)
    }

    /// Names of extensions registered in this session, in registration order.
    pub fn registered_extensions(&self) -> Vec<String> {
        let writer = self.inner.gate();
        writer.registry.iter().map(|e| e.name().to_string()).collect()
    }

    /// Names of every materialized index in the store, registered or not.
    pub fn persisted_extensions(&self) -> Vec<String> {
        let writer = self.inner.gate();
        let mut names: Vec<String> = writer
            .registry
            .iter()
            .map(|e| e.name().to_string())
            .chain(writer.dormant.keys().cloned())
            .collect();
        names.sort();
        names
    }

    /// Forget every persisted index that no extension registered this session.
    ///
    /// The indices disappear from disk at the next checkpoint.
    pub fn drop_orphaned_extensions(&self) -> Vec<String> {
        let mut writer = self.inner.gate();
        let dropped: Vec<String> = std::mem::take(&mut writer.dormant).into_keys().collect();
        if !dropped.is_empty() {
            info!(count = dropped.len(), names = ?dropped, "orphaned extensions dropped");
        }
        dropped
    }

    /// Write a checkpoint and truncate the write-ahead log.
    ///
    /// A no-op for in-memory stores.
    pub fn checkpoint(&self) -> EngineResult<()> {
        let mut writer = self.inner.gate();
        self.inner.checkpoint(&mut writer)
    }

    /// Checkpoint (if persistent) and tell subscribers the store is closing.
    pub fn close(&self) -> EngineResult<()> {
        let result = self.checkpoint();
        self.inner.bus.publish(StoreEvent::Closed {
            store: self.inner.store,
        });
        info!(commit = self.commit(), "store closed");
        result
    }
}

impl EngineInner {
    /// Take the write gate.
    ///
    /// A writer that panicked only ever touched its private snapshot copy,
    /// so a poisoned gate still guards consistent state.
    fn gate(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.published.read().expect("published lock poisoned").snapshot)
    }

    fn commit(&self, writer: &mut WriterState, tx: WriteTransaction) -> EngineResult<u64> {
        let (mut snapshot, mut changes, ops) = tx.into_parts();
        let commit = snapshot.commit + 1;
        snapshot.commit = commit;
        changes.set_commit(commit);

        for extension in &writer.registry {
            maintain(extension.as_ref(), &mut snapshot, &changes)?;
        }

        if let Some(wal) = writer.wal.as_mut() {
            wal.append(&CommitRecord { commit, ops })?;
        }
        mark_stale(&mut writer.dormant, &changes);

        let changes = Arc::new(changes);
        {
            let mut published = self.published.write().expect("published lock poisoned");
            published.snapshot = Arc::new(snapshot);
            published.log.push_back(Arc::clone(&changes));
            self.trim_log(&mut published);
        }
        debug!(commit, collections = ?changes.collections().collect::<Vec<_>>(), "commit published");

        writer.commits_since_checkpoint += 1;
        if self
            .config
            .checkpoint_threshold
            .is_some_and(|threshold| writer.commits_since_checkpoint >= threshold)
        {
            if let Err(e) = self.checkpoint(writer) {
                warn!(commit, error = %e, "automatic checkpoint failed");
            }
        }

        self.bus.publish(StoreEvent::Modified {
            store: self.store,
            commit,
        });
        Ok(commit)
    }

    /// Drop change sets every pinned connection has already consumed.
    fn trim_log(&self, published: &mut Published) {
        let pins = self.pins.lock().expect("pins lock poisoned");
        let oldest_pin = pins
            .values()
            .copied()
            .min()
            .unwrap_or(published.snapshot.commit());
        while published
            .log
            .front()
            .is_some_and(|cs| cs.commit() <= oldest_pin)
        {
            published.log.pop_front();
        }
    }

    fn checkpoint(&self, writer: &mut WriterState) -> EngineResult<()> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };
        let snapshot = self.current();

        let mut extensions = writer.dormant.clone();
        for extension in &writer.registry {
            if let Some(index) = snapshot.extensions.get(extension.name()) {
                extensions.insert(
                    extension.name().to_string(),
                    PersistedIndex {
                        collection: extension.collection().to_string(),
                        index: ExtensionIndex::clone(index),
                        stale_keys: Default::default(),
                        cleared: false,
                    },
                );
            }
        }

        CheckpointFile::capture(&snapshot, extensions).write(&paths.dir, &paths.checkpoint)?;
        if let Some(wal) = writer.wal.as_mut() {
            wal.truncate()?;
        }
        writer.commits_since_checkpoint = 0;
        Ok(())
    }
}

/// Bring one extension's index up to date with a commit.
fn maintain(extension: &dyn Extension, snapshot: &mut Snapshot, changes: &ChangeSet) -> EngineResult<()> {
    let Some(touched) = changes.collection(extension.collection()) else {
        return Ok(());
    };
    let name = extension.name();

    let index = if touched.cleared {
        extension.populate(snapshot)?
    } else {
        let mut index = snapshot
            .extensions
            .remove(name)
            .map(Arc::unwrap_or_clone)
            .unwrap_or_default();
        extension.update(&mut index, snapshot, &touched.keys)?;
        index
    };
    snapshot.extensions.insert(name.to_string(), Arc::new(index));
    Ok(())
}

fn mark_stale(dormant: &mut BTreeMap<String, PersistedIndex>, changes: &ChangeSet) {
    for persisted in dormant.values_mut() {
        if persisted.cleared {
            continue;
        }
        if let Some(touched) = changes.collection(&persisted.collection) {
            if touched.cleared {
                persisted.cleared = true;
                persisted.stale_keys.clear();
            } else {
                persisted.stale_keys.extend(touched.keys.iter().cloned());
            }
        }
    }
}

type Recovered = (StorePaths, WriteAheadLog, Snapshot, BTreeMap<String, PersistedIndex>, u64);

fn recover(dir: PathBuf, config: &EngineConfig) -> EngineResult<Recovered> {
    if dir.exists() && !dir.is_dir() {
        return Err(EngineError::NotADirectory(dir));
    }
    std::fs::create_dir_all(&dir)?;
    let checkpoint_path = dir.join(CHECKPOINT_FILE);

    let (mut snapshot, mut dormant) = match CheckpointFile::load(&checkpoint_path)? {
        Some(mut checkpoint) => {
            let snapshot = checkpoint.restore_collections();
            (snapshot, std::mem::take(&mut checkpoint.extensions))
        }
        None => (Snapshot::default(), BTreeMap::new()),
    };
    let checkpoint_commit = snapshot.commit;

    let mut wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_mode)?;
    let mut replayed = 0;
    for record in wal.recover()? {
        if record.commit <= snapshot.commit {
            continue;
        }
        let mut changes = ChangeSet::new(record.commit);
        for op in &record.ops {
            apply_op(&mut snapshot, op, &mut changes);
        }
        snapshot.commit = record.commit;
        mark_stale(&mut dormant, &changes);
        replayed += 1;
    }

    info!(
        path = %dir.display(),
        checkpoint_commit,
        commit = snapshot.commit,
        replayed,
        persisted_extensions = dormant.len(),
        "store opened"
    );

    let paths = StorePaths {
        dir,
        checkpoint: checkpoint_path,
    };
    Ok((paths, wal, snapshot, dormant, replayed))
}

/// Read connection pinned to one commit until explicitly rolled forward.
pub struct LongLivedConnection {
    inner: Arc<EngineInner>,
    id: u64,
    snapshot: Arc<Snapshot>,
}

impl LongLivedConnection {
    /// Snapshot the connection is pinned to.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn commit(&self) -> u64 {
        self.snapshot.commit()
    }

    /// Move to the latest commit.
    ///
    /// Returns every change set committed since the previous position, in
    /// commit order. The snapshot is always replaced by the latest one, even
    /// when no commit happened in between.
    pub fn roll_forward(&mut self) -> Vec<Arc<ChangeSet>> {
        let mut published = self.inner.published.write().expect("published lock poisoned");
        let from = self.snapshot.commit();
        let changes: Vec<Arc<ChangeSet>> = published
            .log
            .iter()
            .filter(|cs| cs.commit() > from)
            .cloned()
            .collect();
        self.snapshot = Arc::clone(&published.snapshot);
        self.inner
            .pins
            .lock()
            .expect("pins lock poisoned")
            .insert(self.id, self.snapshot.commit());
        self.inner.trim_log(&mut published);
        drop(published);

        if !changes.is_empty() {
            debug!(
                connection = self.id,
                from,
                to = self.snapshot.commit(),
                commits = changes.len(),
                "rolled forward"
            );
        }
        changes
    }
}

impl Drop for LongLivedConnection {
    fn drop(&mut self) {
        if let Ok(mut pins) = self.inner.pins.lock() {
            pins.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Groups keys by the first byte of their value, in key order.
    struct FirstByte {
        name: String,
        collection: String,
        dependencies: Vec<String>,
    }

    impl FirstByte {
        fn new(name: &str, collection: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                collection: collection.into(),
                dependencies: Vec::new(),
            })
        }
    }

    impl Extension for FirstByte {
        fn name(&self) -> &str {
            &self.name
        }

        fn collection(&self) -> &str {
            &self.collection
        }

        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }

        fn populate(&self, snapshot: &Snapshot) -> EngineResult<ExtensionIndex> {
            let mut index = ExtensionIndex::new();
            let keys = snapshot.keys(&self.collection).map(str::to_string).collect();
            self.update(&mut index, snapshot, &keys)?;
            Ok(index)
        }

        fn update(
            &self,
            index: &mut ExtensionIndex,
            snapshot: &Snapshot,
            keys: &BTreeSet<String>,
        ) -> EngineResult<()> {
            for key in keys {
                index.remove(key);
                if let Some(value) = snapshot.get(&self.collection, key) {
                    let group = format!("{}", value.first().copied().unwrap_or(0));
                    let position = index
                        .keys_in(&group)
                        .partition_point(|existing| existing < key);
                    index.insert_at(&group, position, key);
                }
            }
            Ok(())
        }
    }

    fn put(engine: &Engine, key: &str, value: u8) -> u64 {
        engine
            .write(|tx| {
                tx.set("items", key, vec![value], None);
                Ok::<_, EngineError>(())
            })
            .unwrap();
        engine.commit()
    }

    fn memory() -> Engine {
        Engine::in_memory(EngineConfig::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    #[test]
    fn commits_are_numbered_and_isolated() {
        let engine = memory();
        let before = engine.snapshot();
        assert_eq!(put(&engine, "a", 1), 1);
        assert_eq!(put(&engine, "b", 2), 2);

        assert_eq!(before.len("items"), 0);
        assert_eq!(engine.read(|tx| tx.len("items")), 2);
    }

    #[test]
    fn failed_transaction_discards_writes() {
        let engine = memory();
        let result: Result<(), EngineError> = engine.write(|tx| {
            tx.set("items", "a", vec![1], None);
            Err(EngineError::Serialization("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(engine.commit(), 0);
        assert!(!engine.read(|tx| tx.contains("items", "a")));
    }

    #[test]
    fn panicking_writer_does_not_wedge_the_gate() {
        let engine = memory();
        put(&engine, "a", 1);

        let panicking = engine.clone();
        let joined = std::thread::spawn(move || {
            panicking
                .write(|tx| {
                    tx.set("items", "b", vec![2], None);
                    if tx.contains("items", "b") {
                        panic!("writer bug");
                    }
                    Ok::<_, EngineError>(())
                })
                .unwrap();
        })
        .join();
        assert!(joined.is_err());

        assert_eq!(engine.commit(), 1);
        assert!(!engine.read(|tx| tx.contains("items", "b")));
        assert_eq!(put(&engine, "c", 3), 2);
        engine.register_extension(FirstByte::new("first", "items")).unwrap();
        engine.checkpoint().unwrap();
    }

    #[test]
    fn empty_transaction_does_not_commit() {
        let engine = memory();
        let mut events = engine.subscribe();
        engine.write(|_| Ok::<_, EngineError>(())).unwrap();
        assert_eq!(engine.commit(), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn commit_publishes_modified_event() {
        let engine = memory();
        let mut events = engine.subscribe();
        put(&engine, "a", 1);
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::Modified {
                store: engine.store_id(),
                commit: 1
            }
        );
    }

    // -----------------------------------------------------------------------
    // Long-lived connections
    // -----------------------------------------------------------------------

    #[test]
    fn roll_forward_yields_each_commit_once() {
        let engine = memory();
        let mut conn = engine.connect_long_lived();
        put(&engine, "a", 1);
        put(&engine, "b", 1);

        let changes = conn.roll_forward();
        assert_eq!(changes.iter().map(|c| c.commit()).collect::<Vec<_>>(), vec![1, 2]);
        assert!(changes[0].touches_key("items", "a"));
        assert_eq!(conn.commit(), 2);

        assert!(conn.roll_forward().is_empty());
        put(&engine, "c", 1);
        let changes = conn.roll_forward();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].commit(), 3);
    }

    #[test]
    fn log_is_trimmed_once_every_connection_moved_on() {
        let engine = memory();
        let mut slow = engine.connect_long_lived();
        let mut fast = engine.connect_long_lived();
        put(&engine, "a", 1);
        put(&engine, "b", 1);
        fast.roll_forward();
        put(&engine, "c", 1);

        assert_eq!(slow.roll_forward().len(), 3);
        assert_eq!(fast.roll_forward().len(), 1);
        let log_len = engine.inner.published.read().unwrap().log.len();
        assert_eq!(log_len, 0);
    }

    #[test]
    fn dropped_connection_releases_pin() {
        let engine = memory();
        let conn = engine.connect_long_lived();
        put(&engine, "a", 1);
        drop(conn);
        put(&engine, "b", 1);
        assert!(engine.inner.published.read().unwrap().log.is_empty());
        assert!(engine.inner.pins.lock().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Extensions
    // -----------------------------------------------------------------------

    #[test]
    fn extension_is_populated_and_maintained() {
        let engine = memory();
        put(&engine, "b", 1);
        put(&engine, "a", 1);

        let reg = engine.register_extension(FirstByte::new("first", "items")).unwrap();
        assert_eq!(reg, Registration::Built);
        assert_eq!(engine.snapshot().extension("first").unwrap().keys_in("1"), ["a", "b"]);

        put(&engine, "a", 2);
        engine
            .write(|tx| {
                tx.remove("items", "b");
                Ok::<_, EngineError>(())
            })
            .unwrap();
        let snapshot = engine.snapshot();
        let index = snapshot.extension("first").unwrap();
        assert_eq!(index.groups().collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(index.keys_in("2"), ["a"]);

        assert_eq!(
            engine.register_extension(FirstByte::new("first", "items")).unwrap(),
            Registration::Reused
        );
    }

    #[test]
    fn clear_repopulates_extension() {
        let engine = memory();
        engine.register_extension(FirstByte::new("first", "items")).unwrap();
        put(&engine, "a", 1);
        engine
            .write(|tx| {
                tx.remove_all("items");
                tx.set("items", "z", vec![3], None);
                Ok::<_, EngineError>(())
            })
            .unwrap();
        let snapshot = engine.snapshot();
        let index = snapshot.extension("first").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.position_of("z"), Some(("3", 0)));
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let engine = memory();
        let ext = Arc::new(FirstByte {
            name: "child".into(),
            collection: "items".into(),
            dependencies: vec!["parent".into()],
        });
        let err = engine.register_extension(ext).unwrap_err();
        assert!(matches!(err, EngineError::MissingDependency { dependency, .. } if dependency == "parent"));
    }

    #[test]
    fn unregistered_extension_is_missing() {
        let engine = memory();
        let err = engine.read(|tx| tx.extension("nope").map(|_| ()).unwrap_err());
        assert!(matches!(err, EngineError::MissingExtension(_)));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn reopen_replays_wal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            put(&engine, "a", 1);
            put(&engine, "b", 2);
        }
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.commit(), 2);
        assert_eq!(engine.read(|tx| tx.get("items", "b").map(<[u8]>::to_vec)), Some(vec![2]));
    }

    #[test]
    fn checkpoint_then_wal_tail() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            put(&engine, "a", 1);
            engine.checkpoint().unwrap();
            put(&engine, "b", 2);
        }
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.commit(), 2);
        assert_eq!(engine.read(|tx| tx.len("items")), 2);
    }

    #[test]
    fn commits_after_a_torn_wal_tail_survive_reopen() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            put(&engine, "a", 1);
        }
        // A crash mid-append leaves a header promising more than was written.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(WAL_FILE))
            .unwrap();
        file.write_all(&4096u32.to_le_bytes()).unwrap();
        file.write_all(&[0, 0, 0, 0, 7, 7, 7]).unwrap();
        drop(file);

        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            assert_eq!(engine.commit(), 1);
            put(&engine, "b", 2);
            put(&engine, "c", 3);
        }
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.commit(), 3);
        assert_eq!(engine.read(|tx| tx.get("items", "c").map(<[u8]>::to_vec)), Some(vec![3]));
    }

    #[test]
    fn automatic_checkpoint_truncates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            checkpoint_threshold: Some(2),
            ..EngineConfig::default()
        };
        let engine = Engine::open(dir.path(), config).unwrap();
        put(&engine, "a", 1);
        put(&engine, "b", 1);
        assert!(dir.path().join(CHECKPOINT_FILE).exists());
        assert_eq!(std::fs::metadata(dir.path().join(WAL_FILE)).unwrap().len(), 0);
    }

    #[test]
    fn persisted_extension_is_reused_and_caught_up() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            engine.register_extension(FirstByte::new("first", "items")).unwrap();
            put(&engine, "a", 1);
            engine.checkpoint().unwrap();
            // Written after the checkpoint: replayed from the WAL.
            put(&engine, "b", 1);
        }

        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.persisted_extensions(), vec!["first".to_string()]);
        assert!(engine.registered_extensions().is_empty());

        // Written while the index is dormant.
        put(&engine, "c", 1);

        let reg = engine.register_extension(FirstByte::new("first", "items")).unwrap();
        assert_eq!(reg, Registration::Reused);
        assert_eq!(engine.snapshot().extension("first").unwrap().keys_in("1"), ["a", "b", "c"]);
    }

    #[test]
    fn orphaned_extensions_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            engine.register_extension(FirstByte::new("old", "items")).unwrap();
            engine.close().unwrap();
        }
        {
            let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
            engine.register_extension(FirstByte::new("new", "items")).unwrap();
            assert_eq!(engine.drop_orphaned_extensions(), vec!["old".to_string()]);
            engine.close().unwrap();
        }
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.persisted_extensions(), vec!["new".to_string()]);
    }

    #[test]
    fn file_path_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let err = Engine::open(&file, EngineConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::NotADirectory(_)));
    }

    #[test]
    fn close_publishes_closed() {
        let engine = memory();
        let mut events = engine.subscribe();
        engine.close().unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::Closed {
                store: engine.store_id()
            }
        );
    }

    #[test]
    fn stores_sharing_a_bus_are_told_apart() {
        let bus = EventBus::new(8);
        let first =
            Engine::with_event_bus(StoreLocation::InMemory, EngineConfig::default(), bus.clone()).unwrap();
        let second =
            Engine::with_event_bus(StoreLocation::InMemory, EngineConfig::default(), bus.clone()).unwrap();
        assert_ne!(first.store_id(), second.store_id());

        let mut events = bus.subscribe();
        first.close().unwrap();
        put(&second, "a", 1);
        assert_eq!(events.try_recv().unwrap().store(), first.store_id());
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::Modified {
                store: second.store_id(),
                commit: 1
            }
        );
    }
}
