use std::marker::PhantomData;
use std::ops::ControlFlow;

use vellum_codec::{decode, peek_header, Decoded, ObjectMetadata, StorableObject};
use vellum_engine::Snapshot;

use crate::error::CollectionResult;

/// Typed, read-only access to one collection within a snapshot.
///
/// Records that do not decode as `T` (another type, another schema version,
/// unreadable bytes) are treated as absent.
pub struct CollectionReadTransaction<'a, T> {
    snapshot: &'a Snapshot,
    collection: &'a str,
    _object: PhantomData<fn() -> T>,
}

impl<'a, T: StorableObject> CollectionReadTransaction<'a, T> {
    pub fn new(snapshot: &'a Snapshot, collection: &'a str) -> Self {
        Self {
            snapshot,
            collection,
            _object: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        self.collection
    }

    /// Commit the underlying snapshot reflects.
    pub fn commit(&self) -> u64 {
        self.snapshot.commit()
    }

    /// Object stored under `key`, if present and readable as `T`.
    pub fn get(&self, key: &str) -> Option<T> {
        let bytes = self.snapshot.get(self.collection, key)?;
        decode::<T>(bytes).into_valid()
    }

    /// Decoded form of the record under `key`, including the invalid sentinel.
    pub fn get_decoded(&self, key: &str) -> Option<Decoded<T>> {
        self.snapshot
            .get(self.collection, key)
            .map(|bytes| decode::<T>(bytes))
    }

    /// Objects for several keys, in the order given.
    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<T>> {
        keys.iter().map(|key| self.get(key.as_ref())).collect()
    }

    /// Metadata stored alongside the object under `key`.
    pub fn get_metadata(&self, key: &str) -> CollectionResult<Option<ObjectMetadata>> {
        match self.snapshot.metadata(self.collection, key) {
            Some(bytes) => Ok(Some(ObjectMetadata::decode(bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns `true` if `key` holds a record written as the current `T`.
    pub fn contains(&self, key: &str) -> bool {
        self.snapshot
            .get(self.collection, key)
            .is_some_and(is_current::<T>)
    }

    /// Visit keys in lexicographic order until `f` breaks.
    pub fn enumerate_keys(&self, mut f: impl FnMut(&str) -> ControlFlow<()>) {
        for (key, record) in self.snapshot.iter(self.collection) {
            if !is_current::<T>(&record.object) {
                continue;
            }
            if f(key).is_break() {
                break;
            }
        }
    }

    /// Visit readable objects in key order until `f` breaks.
    pub fn enumerate_objects(&self, mut f: impl FnMut(&str, T) -> ControlFlow<()>) {
        for (key, record) in self.snapshot.iter(self.collection) {
            let Decoded::Valid(object) = decode::<T>(&record.object) else {
                continue;
            };
            if f(key, object).is_break() {
                break;
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.enumerate_keys(|key| {
            keys.push(key.to_string());
            ControlFlow::Continue(())
        });
        keys
    }

    pub fn objects(&self) -> Vec<(String, T)> {
        self.filter(|_, _| true)
    }

    /// Every readable object matching `predicate`, in key order.
    ///
    /// A full scan: there is no secondary index.
    pub fn filter(&self, mut predicate: impl FnMut(&str, &T) -> bool) -> Vec<(String, T)> {
        let mut matches = Vec::new();
        self.enumerate_objects(|key, object| {
            if predicate(key, &object) {
                matches.push((key.to_string(), object));
            }
            ControlFlow::Continue(())
        });
        matches
    }

    /// Number of records written as the current `T`.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.enumerate_keys(|_| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.enumerate_keys(|_| {
            empty = false;
            ControlFlow::Break(())
        });
        empty
    }
}

fn is_current<T: StorableObject>(bytes: &[u8]) -> bool {
    peek_header(bytes).is_some_and(|h| h.type_id == T::TYPE_ID && h.version == T::VERSION)
}
