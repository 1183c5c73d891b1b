use std::marker::PhantomData;

use tracing::trace;
use vellum_codec::{encode, ObjectMetadata, PrimaryKey, StorableObject};
use vellum_engine::WriteTransaction;

use crate::error::CollectionResult;
use crate::read::CollectionReadTransaction;

/// Result of a [`CollectionWriteTransaction::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// Object and fresh metadata were written.
    Written,
    /// The stored content already had the same fingerprint; nothing was written.
    Unchanged,
}

impl PutOutcome {
    pub fn is_written(self) -> bool {
        self == Self::Written
    }
}

/// Typed read-write access to one collection within a write transaction.
pub struct CollectionWriteTransaction<'a, T> {
    tx: &'a mut WriteTransaction,
    collection: &'a str,
    _object: PhantomData<fn() -> T>,
}

impl<'a, T: StorableObject> CollectionWriteTransaction<'a, T> {
    pub fn new(tx: &'a mut WriteTransaction, collection: &'a str) -> Self {
        Self {
            tx,
            collection,
            _object: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        self.collection
    }

    /// Read view over the transaction, including its own writes.
    pub fn reader(&self) -> CollectionReadTransaction<'_, T> {
        CollectionReadTransaction::new(&**self.tx, self.collection)
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.reader().get(key)
    }

    pub fn get_metadata(&self, key: &str) -> CollectionResult<Option<ObjectMetadata>> {
        self.reader().get_metadata(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.reader().contains(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.reader().keys()
    }

    pub fn len(&self) -> usize {
        self.reader().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader().is_empty()
    }

    /// Store `object` under `key` unless the stored content is identical.
    ///
    /// Identical content is detected by fingerprint. A suppressed put writes
    /// nothing at all, so the stored write time is left as it was.
    pub fn put(&mut self, key: &str, object: &T) -> CollectionResult<PutOutcome> {
        let fingerprint = object.fingerprint()?;
        if let Some(existing) = self.get_metadata(key)? {
            if existing.fingerprint == fingerprint {
                trace!(collection = self.collection, key, %fingerprint, "put suppressed");
                return Ok(PutOutcome::Unchanged);
            }
        }

        let bytes = encode(object)?;
        let metadata = ObjectMetadata::now(fingerprint).encode()?;
        self.tx.set(self.collection, key, bytes, Some(metadata));
        Ok(PutOutcome::Written)
    }

    /// Put several objects; returns how many were physically written.
    pub fn put_many<'o, K: AsRef<str>>(
        &mut self,
        entries: impl IntoIterator<Item = (K, &'o T)>,
    ) -> CollectionResult<usize> {
        let mut written = 0;
        for (key, object) in entries {
            if self.put(key.as_ref(), object)?.is_written() {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Remove `key`. Returns `true` if a record existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.tx.remove(self.collection, key)
    }

    /// Remove several keys; returns how many existed.
    pub fn remove_many<K: AsRef<str>>(&mut self, keys: impl IntoIterator<Item = K>) -> usize {
        keys.into_iter()
            .filter(|key| self.tx.remove(self.collection, key.as_ref()))
            .count()
    }

    /// Remove every record of the collection, readable or not.
    pub fn remove_all(&mut self) -> usize {
        self.tx.remove_all(self.collection)
    }

    /// Clear the collection, then put `entries`.
    pub fn replace_all<'o, K: AsRef<str>>(
        &mut self,
        entries: impl IntoIterator<Item = (K, &'o T)>,
    ) -> CollectionResult<usize> {
        self.remove_all();
        self.put_many(entries)
    }
}

impl<T: StorableObject + PrimaryKey> CollectionWriteTransaction<'_, T> {
    /// Put an object under its own primary key.
    pub fn put_object(&mut self, object: &T) -> CollectionResult<PutOutcome> {
        self.put(&object.primary_key(), object)
    }

    pub fn put_objects<'o>(&mut self, objects: impl IntoIterator<Item = &'o T>) -> CollectionResult<usize> {
        let mut written = 0;
        for object in objects {
            if self.put_object(object)?.is_written() {
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn replace_all_objects<'o>(
        &mut self,
        objects: impl IntoIterator<Item = &'o T>,
    ) -> CollectionResult<usize> {
        self.remove_all();
        self.put_objects(objects)
    }
}
