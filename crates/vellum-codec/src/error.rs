/// Errors from encoding objects and metadata.
///
/// Decoding an *object* never produces one of these: unreadable objects
/// degrade to [`crate::Decoded::Invalid`]. Metadata is engine-owned and does
/// not degrade.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The object's fields could not be serialized.
    #[error("cannot serialize object of type '{type_id}': {reason}")]
    Serialization { type_id: &'static str, reason: String },

    /// Envelope or metadata bytes could not be produced.
    #[error("envelope encoding error: {0}")]
    Envelope(String),

    /// Stored metadata could not be read back.
    #[error("corrupt object metadata: {0}")]
    CorruptMetadata(String),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
