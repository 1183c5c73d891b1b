use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, CodecResult};
use crate::fingerprint::{Fingerprint, FingerprintHasher};

/// A value that can live in a Vellum collection.
///
/// `TYPE_ID` must be stable across releases: it is written into every stored
/// envelope and into materialized view names. `VERSION` must be bumped
/// whenever the serialized field layout changes incompatibly; records written
/// under another version decode to the invalid sentinel.
pub trait StorableObject: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable type identifier.
    const TYPE_ID: &'static str;

    /// Declared schema version.
    const VERSION: u32;

    /// Content fingerprint used to suppress redundant writes.
    ///
    /// Defaults to a BLAKE3 digest of the type identifier, the version and
    /// the object's field payload. Override when the serialized form is not
    /// canonical (for example when it contains a `HashMap`).
    fn fingerprint(&self) -> CodecResult<Fingerprint> {
        let payload = payload_bytes(self)?;
        Ok(FingerprintHasher::OBJECT.hash_parts(&[
            Self::TYPE_ID.as_bytes(),
            &Self::VERSION.to_le_bytes(),
            &payload,
        ]))
    }
}

/// Objects that carry their own collection key.
pub trait PrimaryKey {
    fn primary_key(&self) -> String;
}

/// Serialize an object's fields into the payload representation.
pub(crate) fn payload_bytes<T: StorableObject>(object: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(object).map_err(|e| CodecError::Serialization {
        type_id: T::TYPE_ID,
        reason: e.to_string(),
    })
}
