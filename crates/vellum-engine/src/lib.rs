//! Embedded transactional key-value engine for Vellum.
//!
//! A single process-local store of named collections mapping string keys to
//! opaque byte records. Writers are serialized behind one gate; readers work
//! on immutable, copy-on-write [`Snapshot`]s and never block writers.
//!
//! # Key Types
//!
//! - [`Engine`] -- store handle: read/write transactions, extensions, checkpoints
//! - [`Snapshot`] / [`WriteTransaction`] -- read and read-write transaction views
//! - [`ChangeSet`] -- keys touched by one commit, kept in a log for long-lived readers
//! - [`LongLivedConnection`] -- snapshot pinned to a commit, advanced with `roll_forward`
//! - [`Extension`] / [`ExtensionIndex`] -- materialized indices maintained on every commit
//! - [`EventBus`] / [`StoreEvent`] -- modified-event broadcast
//!
//! # Persistence
//!
//! A persistent store is a directory holding a CRC-framed write-ahead log of
//! commit records and a checkpoint of the full state, including every
//! materialized index. Opening a store loads the checkpoint and replays the
//! log; persisted indices stay dormant until an extension with the same name
//! is registered again.

pub mod bus;
pub mod change;
mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod extension;
pub mod snapshot;
pub mod transaction;
pub mod wal;

pub use bus::{EventBus, StoreEvent};
pub use change::{ChangeSet, CollectionChanges};
pub use config::{EngineConfig, SyncMode};
pub use engine::{Engine, LongLivedConnection, StoreLocation, CHECKPOINT_FILE, WAL_FILE};
pub use error::{EngineError, EngineResult};
pub use extension::{Extension, ExtensionIndex, Registration};
pub use snapshot::{Record, Snapshot};
pub use transaction::{ReadTransaction, WriteTransaction};
