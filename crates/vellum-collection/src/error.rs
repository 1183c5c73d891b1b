use vellum_codec::CodecError;
use vellum_engine::EngineError;

/// Errors raised by typed collection transactions.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
