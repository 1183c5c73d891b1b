use std::marker::PhantomData;
use std::sync::Arc;

use vellum_codec::{ObjectMetadata, PrimaryKey, StorableObject};
use vellum_collection::{CollectionReadTransaction, CollectionWriteTransaction, PutOutcome};
use vellum_observe::{CollectionObserver, FlatViewObserver, ObjectObserver, ViewObserver};
use vellum_view::{CollectionView, ViewHandle};

use crate::database::{Database, PendingWrite};
use crate::error::VellumResult;

/// Typed handle to one named collection of a [`Database`].
///
/// Reads run against the latest snapshot. Mutators without a suffix are
/// queued on the database's writer thread and return a [`PendingWrite`];
/// the `_sync` variants commit on the calling thread.
pub struct Collection<T> {
    db: Database,
    name: String,
    _object: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            name: self.name.clone(),
            _object: PhantomData,
        }
    }
}

impl<T: StorableObject> Collection<T> {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
            _object: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ---- Reads ----

    /// Run `f` against one consistent snapshot of the collection.
    pub fn read<R>(&self, f: impl FnOnce(&CollectionReadTransaction<'_, T>) -> R) -> R {
        let snapshot = self.db.engine().snapshot();
        f(&CollectionReadTransaction::new(&snapshot, &self.name))
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.read(|r| r.get(key))
    }

    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<T>> {
        self.read(|r| r.get_many(keys))
    }

    pub fn metadata(&self, key: &str) -> VellumResult<Option<ObjectMetadata>> {
        Ok(self.read(|r| r.get_metadata(key))?)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read(|r| r.contains(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.read(|r| r.keys())
    }

    pub fn objects(&self) -> Vec<(String, T)> {
        self.read(|r| r.objects())
    }

    pub fn filter(&self, predicate: impl FnMut(&str, &T) -> bool) -> Vec<(String, T)> {
        self.read(|r| r.filter(predicate))
    }

    pub fn len(&self) -> usize {
        self.read(|r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- Synchronous writes ----

    /// Run `f` as a read-write transaction over this collection.
    pub fn write_sync<R>(
        &self,
        f: impl FnOnce(&mut CollectionWriteTransaction<'_, T>) -> VellumResult<R>,
    ) -> VellumResult<R> {
        self.db
            .write(|tx| f(&mut CollectionWriteTransaction::new(tx, &self.name)))
    }

    pub fn put_sync(&self, key: &str, object: &T) -> VellumResult<PutOutcome> {
        self.write_sync(|w| Ok(w.put(key, object)?))
    }

    pub fn put_many_sync<'o, K: AsRef<str>>(
        &self,
        entries: impl IntoIterator<Item = (K, &'o T)>,
    ) -> VellumResult<usize> {
        self.write_sync(|w| Ok(w.put_many(entries)?))
    }

    pub fn remove_sync(&self, key: &str) -> VellumResult<bool> {
        self.write_sync(|w| Ok(w.remove(key)))
    }

    pub fn remove_many_sync<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>) -> VellumResult<usize> {
        self.write_sync(|w| Ok(w.remove_many(keys)))
    }

    pub fn remove_all_sync(&self) -> VellumResult<usize> {
        self.write_sync(|w| Ok(w.remove_all()))
    }

    pub fn replace_all_sync<'o, K: AsRef<str>>(
        &self,
        entries: impl IntoIterator<Item = (K, &'o T)>,
    ) -> VellumResult<usize> {
        self.write_sync(|w| Ok(w.replace_all(entries)?))
    }

    // ---- Queued writes ----

    /// Queue `f` as a read-write transaction over this collection.
    pub fn write<R, F>(&self, f: F) -> PendingWrite<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut CollectionWriteTransaction<'_, T>) -> VellumResult<R> + Send + 'static,
    {
        let name = self.name.clone();
        self.db
            .write_async(move |tx| f(&mut CollectionWriteTransaction::new(tx, &name)))
    }

    pub fn put(&self, key: impl Into<String>, object: T) -> PendingWrite<PutOutcome> {
        let key = key.into();
        self.write(move |w| Ok(w.put(&key, &object)?))
    }

    pub fn put_many(&self, entries: Vec<(String, T)>) -> PendingWrite<usize> {
        self.write(move |w| Ok(w.put_many(entries.iter().map(|(k, o)| (k, o)))?))
    }

    pub fn remove(&self, key: impl Into<String>) -> PendingWrite<bool> {
        let key = key.into();
        self.write(move |w| Ok(w.remove(&key)))
    }

    pub fn remove_many(&self, keys: Vec<String>) -> PendingWrite<usize> {
        self.write(move |w| Ok(w.remove_many(keys)))
    }

    pub fn remove_all(&self) -> PendingWrite<usize> {
        self.write(|w| Ok(w.remove_all()))
    }

    pub fn replace_all(&self, entries: Vec<(String, T)>) -> PendingWrite<usize> {
        self.write(move |w| Ok(w.replace_all(entries.iter().map(|(k, o)| (k, o)))?))
    }

    // ---- Views and observers ----

    /// Register `view` over this collection.
    pub fn register_view<V>(&self, view: Arc<V>) -> VellumResult<ViewHandle<V>>
    where
        V: CollectionView<Object = T>,
    {
        self.db.register_view(view, &self.name)
    }

    /// Observe the object stored under `key`.
    pub fn observe_key(&self, key: &str) -> VellumResult<ObjectObserver<T>> {
        self.db.ensure_open()?;
        Ok(self.db.hub().observe_key(&self.name, key)?)
    }

    /// Observe the whole collection.
    pub fn observe(&self) -> VellumResult<CollectionObserver<T>> {
        self.db.ensure_open()?;
        Ok(self.db.hub().observe_collection(&self.name)?)
    }

    /// Register `view` over this collection and observe it.
    pub fn observe_view<V>(&self, view: Arc<V>) -> VellumResult<ViewObserver<V>>
    where
        V: CollectionView<Object = T>,
    {
        let handle = self.register_view(view)?;
        self.db.observe_view(&handle)
    }

    /// Register `view` over this collection and observe it as a flat list.
    pub fn observe_flat<V>(&self, view: Arc<V>) -> VellumResult<FlatViewObserver<V>>
    where
        V: CollectionView<Object = T>,
    {
        let handle = self.register_view(view)?;
        self.db.observe_flat(&handle)
    }
}

impl<T: StorableObject + PrimaryKey> Collection<T> {
    pub fn put_object_sync(&self, object: &T) -> VellumResult<PutOutcome> {
        self.write_sync(|w| Ok(w.put_object(object)?))
    }

    pub fn put_objects_sync<'o>(&self, objects: impl IntoIterator<Item = &'o T>) -> VellumResult<usize> {
        self.write_sync(|w| Ok(w.put_objects(objects)?))
    }

    pub fn put_object(&self, object: T) -> PendingWrite<PutOutcome> {
        self.write(move |w| Ok(w.put_object(&object)?))
    }

    pub fn put_objects(&self, objects: Vec<T>) -> PendingWrite<usize> {
        self.write(move |w| Ok(w.put_objects(&objects)?))
    }
}
