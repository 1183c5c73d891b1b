//! Typed collection transactions for Vellum.
//!
//! Wraps the engine's byte-oriented transactions with the object codec:
//! reads decode envelopes (and treat unreadable records as absent), writes
//! encode envelopes together with [`ObjectMetadata`](vellum_codec::ObjectMetadata)
//! and skip the physical write entirely when the stored fingerprint already
//! matches the new content.
//!
//! # Key Types
//!
//! - [`CollectionReadTransaction`] -- typed reads over one collection of a snapshot
//! - [`CollectionWriteTransaction`] -- typed reads and suppressed writes within a write transaction
//! - [`PutOutcome`] -- whether a put was written or suppressed

pub mod error;
pub mod read;
pub mod write;

pub use error::{CollectionError, CollectionResult};
pub use read::CollectionReadTransaction;
pub use write::{CollectionWriteTransaction, PutOutcome};
