//! Object envelopes.
//!
//! On-disk layout (bincode):
//! ```text
//! [type_id: string] [version: u32] [payload: bytes (serde_json of the object)]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CodecError, CodecResult};
use crate::object::{payload_bytes, StorableObject};

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    type_id: &'a str,
    version: u32,
    payload: &'a [u8],
}

#[derive(Deserialize)]
struct Envelope {
    type_id: String,
    version: u32,
    payload: Vec<u8>,
}

/// Type identifier and version read from an envelope without its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub type_id: String,
    pub version: u32,
}

/// Why a stored record could not be reconstructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    /// The bytes are not an envelope at all.
    UnreadableEnvelope(String),
    /// The envelope names a different type than the one being read.
    UnknownType { expected: String },
    /// The envelope was written under another schema version.
    VersionSkew { expected: u32 },
    /// The payload does not match the type's current fields.
    UnreadablePayload(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnreadableEnvelope(e) => write!(f, "unreadable envelope: {e}"),
            Self::UnknownType { expected } => write!(f, "expected type '{expected}'"),
            Self::VersionSkew { expected } => write!(f, "expected version {expected}"),
            Self::UnreadablePayload(e) => write!(f, "unreadable payload: {e}"),
        }
    }
}

/// Sentinel for a record that exists but cannot be read as the requested type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidObject {
    /// Type identifier found in the envelope, if it could be read.
    pub type_id: Option<String>,
    /// Version found in the envelope, if it could be read.
    pub version: Option<u32>,
    pub reason: InvalidReason,
}

/// Result of decoding a stored record.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded<T> {
    Valid(T),
    Invalid(InvalidObject),
}

impl<T> Decoded<T> {
    /// Returns `true` for a successfully reconstructed object.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The object, or `None` for the invalid sentinel.
    pub fn into_valid(self) -> Option<T> {
        match self {
            Self::Valid(object) => Some(object),
            Self::Invalid(_) => None,
        }
    }

    /// Borrow the object, or `None` for the invalid sentinel.
    pub fn as_valid(&self) -> Option<&T> {
        match self {
            Self::Valid(object) => Some(object),
            Self::Invalid(_) => None,
        }
    }
}

/// Encode an object into its versioned envelope.
pub fn encode<T: StorableObject>(object: &T) -> CodecResult<Vec<u8>> {
    let payload = payload_bytes(object)?;
    let envelope = EnvelopeRef {
        type_id: T::TYPE_ID,
        version: T::VERSION,
        payload: &payload,
    };
    bincode::serialize(&envelope).map_err(|e| CodecError::Envelope(e.to_string()))
}

/// Decode an envelope as `T`.
///
/// Never fails: identifier mismatch, version skew and unreadable bytes all
/// produce [`Decoded::Invalid`] and a warning.
pub fn decode<T: StorableObject>(bytes: &[u8]) -> Decoded<T> {
    let decoded = decode_inner::<T>(bytes);
    if let Decoded::Invalid(ref invalid) = decoded {
        warn!(
            expected_type = T::TYPE_ID,
            expected_version = T::VERSION,
            found_type = ?invalid.type_id,
            found_version = ?invalid.version,
            reason = %invalid.reason,
            "cannot deserialize stored object; treating it as invalid"
        );
    }
    decoded
}

fn decode_inner<T: StorableObject>(bytes: &[u8]) -> Decoded<T> {
    let envelope: Envelope = match bincode::deserialize(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Decoded::Invalid(InvalidObject {
                type_id: None,
                version: None,
                reason: InvalidReason::UnreadableEnvelope(e.to_string()),
            })
        }
    };

    let invalid = |reason| {
        Decoded::Invalid(InvalidObject {
            type_id: Some(envelope.type_id.clone()),
            version: Some(envelope.version),
            reason,
        })
    };

    if envelope.type_id != T::TYPE_ID {
        return invalid(InvalidReason::UnknownType {
            expected: T::TYPE_ID.to_string(),
        });
    }
    if envelope.version != T::VERSION {
        return invalid(InvalidReason::VersionSkew {
            expected: T::VERSION,
        });
    }

    match serde_json::from_slice::<T>(&envelope.payload) {
        Ok(object) => Decoded::Valid(object),
        Err(e) => invalid(InvalidReason::UnreadablePayload(e.to_string())),
    }
}

/// Read the type identifier and version of an envelope.
///
/// Returns `None` when the bytes are not an envelope.
pub fn peek_header(bytes: &[u8]) -> Option<EnvelopeHeader> {
    bincode::deserialize::<Envelope>(bytes)
        .ok()
        .map(|envelope| EnvelopeHeader {
            type_id: envelope.type_id,
            version: envelope.version,
        })
}

/// Header and field payload of an envelope, without a Rust type.
#[derive(Clone, Debug, PartialEq)]
pub struct RawObject {
    pub header: EnvelopeHeader,
    pub fields: serde_json::Value,
}

/// Read an envelope without knowing its type, for inspection tools.
///
/// Returns `None` when the bytes are not an envelope or the payload is not
/// valid JSON.
pub fn inspect(bytes: &[u8]) -> Option<RawObject> {
    let envelope = bincode::deserialize::<Envelope>(bytes).ok()?;
    let fields = serde_json::from_slice(&envelope.payload).ok()?;
    Some(RawObject {
        header: EnvelopeHeader {
            type_id: envelope.type_id,
            version: envelope.version,
        },
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct UserV1 {
        name: String,
        age: u32,
    }

    impl StorableObject for UserV1 {
        const TYPE_ID: &'static str = "user";
        const VERSION: u32 = 1;
    }

    // Same identifier, bumped schema.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct UserV2 {
        name: String,
        age: u32,
    }

    impl StorableObject for UserV2 {
        const TYPE_ID: &'static str = "user";
        const VERSION: u32 = 2;
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Team {
        title: String,
    }

    impl StorableObject for Team {
        const TYPE_ID: &'static str = "team";
        const VERSION: u32 = 1;
    }

    // Same identifier and version as UserV1 but incompatible fields.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct UserRenamed {
        full_name: String,
    }

    impl StorableObject for UserRenamed {
        const TYPE_ID: &'static str = "user";
        const VERSION: u32 = 1;
    }

    fn al() -> UserV1 {
        UserV1 {
            name: "Al".into(),
            age: 30,
        }
    }

    #[test]
    fn roundtrip_same_version() {
        let bytes = encode(&al()).unwrap();
        assert_eq!(decode::<UserV1>(&bytes), Decoded::Valid(al()));
    }

    #[test]
    fn version_skew_yields_sentinel() {
        let bytes = encode(&al()).unwrap();
        match decode::<UserV2>(&bytes) {
            Decoded::Invalid(invalid) => {
                assert_eq!(invalid.type_id.as_deref(), Some("user"));
                assert_eq!(invalid.version, Some(1));
                assert_eq!(invalid.reason, InvalidReason::VersionSkew { expected: 2 });
            }
            other => panic!("expected sentinel, got {other:?}"),
        }
    }

    #[test]
    fn foreign_type_yields_sentinel() {
        let bytes = encode(&al()).unwrap();
        let decoded = decode::<Team>(&bytes);
        assert!(!decoded.is_valid());
        assert!(decoded.into_valid().is_none());
    }

    #[test]
    fn garbage_yields_sentinel() {
        match decode::<UserV1>(b"\x01\x02") {
            Decoded::Invalid(invalid) => {
                assert!(invalid.type_id.is_none());
                assert!(matches!(invalid.reason, InvalidReason::UnreadableEnvelope(_)));
            }
            other => panic!("expected sentinel, got {other:?}"),
        }
    }

    #[test]
    fn incompatible_payload_yields_sentinel() {
        let bytes = encode(&al()).unwrap();
        match decode::<UserRenamed>(&bytes) {
            Decoded::Invalid(invalid) => {
                assert!(matches!(invalid.reason, InvalidReason::UnreadablePayload(_)));
            }
            other => panic!("expected sentinel, got {other:?}"),
        }
    }

    #[test]
    fn inspect_exposes_fields() {
        let raw = inspect(&encode(&al()).unwrap()).unwrap();
        assert_eq!(raw.header.type_id, "user");
        assert_eq!(raw.header.version, 1);
        assert_eq!(raw.fields["name"], "Al");
        assert!(inspect(b"nope").is_none());
    }

    #[test]
    fn peek_reads_header_only() {
        let bytes = encode(&al()).unwrap();
        let header = peek_header(&bytes).unwrap();
        assert_eq!(header.type_id, "user");
        assert_eq!(header.version, 1);
        assert!(peek_header(b"nope").is_none());
    }

    proptest! {
        #[test]
        fn roundtrip_preserves_content(name in ".{0,24}", age in any::<u32>()) {
            let user = UserV1 { name, age };
            let bytes = encode(&user).unwrap();
            prop_assert_eq!(decode::<UserV1>(&bytes), Decoded::Valid(user));
        }
    }
}
