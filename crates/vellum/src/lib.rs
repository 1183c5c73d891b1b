//! Vellum: typed, observable collections over an embedded transactional store.
//!
//! Open a [`Database`], take a typed [`Collection`] by name, write objects
//! through it, register materialized views over it, and observe keys,
//! whole collections or views. Observers are refreshed on a background
//! worker after every commit and deliver changes on the database's single
//! delivery thread.
//!
//! # Key Types
//!
//! - [`Database`] -- an open store with its writer and observation threads
//! - [`Collection`] -- typed reads, synchronous and queued writes, observers
//! - [`DatabaseConfig`] -- engine settings and close-time view pruning, loadable from TOML
//! - [`PendingWrite`] -- completion handle of a queued write
//! - [`VellumError`] -- every error the public API returns

pub mod collection;
pub mod config;
pub mod database;
pub mod error;

pub use collection::Collection;
pub use config::DatabaseConfig;
pub use database::{Database, PendingWrite};
pub use error::{VellumError, VellumResult};

pub use vellum_codec::{Fingerprint, ObjectMetadata, PrimaryKey, StorableObject};
pub use vellum_collection::{CollectionReadTransaction, CollectionWriteTransaction, PutOutcome};
pub use vellum_engine::{EngineConfig, ReadTransaction, Registration, SyncMode, WriteTransaction};
pub use vellum_observe::{
    ChangeKind, CollectionObserver, FlatViewObserver, ListenerId, ObjectObserver, ObserverState,
    RowChange, SectionChange, SectionChangeKind, ViewListener, ViewObserver, ViewUpdate,
};
pub use vellum_view::{
    CollectionView, FilteredView, FlatView, IndexPath, ViewHandle, ViewMappings, ViewSpec, FLAT_GROUP,
};
