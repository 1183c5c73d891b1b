use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};
use crate::fingerprint::Fingerprint;

/// Metadata persisted alongside every stored object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Fingerprint of the object content at write time.
    pub fingerprint: Fingerprint,
    /// When the object content was last physically written.
    pub written_at: DateTime<Utc>,
}

impl ObjectMetadata {
    /// Metadata for a write happening now.
    pub fn now(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            written_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CodecError::Envelope(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        bincode::deserialize(bytes).map_err(|e| CodecError::CorruptMetadata(e.to_string()))
    }
}
