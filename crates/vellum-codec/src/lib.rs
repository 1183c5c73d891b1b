//! Versioned object codec for Vellum.
//!
//! Every object written to a Vellum store is wrapped in an envelope carrying
//! the object's type identifier and its declared schema version. Reading an
//! object back only succeeds when both match what the reading type declares
//! *now*; anything else decodes to the [`Decoded::Invalid`] sentinel so that
//! a store survives schema evolution instead of crashing its readers.
//!
//! # Key Types
//!
//! - [`StorableObject`] -- trait implemented by every storable type
//! - [`Decoded`] / [`InvalidObject`] -- decode result and its sentinel
//! - [`Fingerprint`] / [`FingerprintHasher`] -- content digests for no-op write detection
//! - [`ObjectMetadata`] -- fingerprint and write time persisted next to each object

pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod object;

pub use envelope::{
    decode, encode, inspect, peek_header, Decoded, EnvelopeHeader, InvalidObject, InvalidReason, RawObject,
};
pub use error::{CodecError, CodecResult};
pub use fingerprint::{Fingerprint, FingerprintHasher};
pub use metadata::ObjectMetadata;
pub use object::{PrimaryKey, StorableObject};
