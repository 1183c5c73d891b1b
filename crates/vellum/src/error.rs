use thiserror::Error;

use vellum_codec::CodecError;
use vellum_collection::CollectionError;
use vellum_engine::EngineError;
use vellum_observe::ObserveError;
use vellum_view::ViewError;

#[derive(Debug, Error)]
pub enum VellumError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("view error: {0}")]
    View(#[from] ViewError),

    #[error("observer error: {0}")]
    Observe(#[from] ObserveError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A queued write closure panicked; nothing was committed.
    #[error("queued write panicked: {0}")]
    WritePanicked(String),

    /// The database was closed before the operation could run.
    #[error("database is closed")]
    Closed,
}

impl From<CollectionError> for VellumError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::Codec(e) => Self::Codec(e),
            CollectionError::Engine(e) => Self::Engine(e),
        }
    }
}

pub type VellumResult<T> = Result<T, VellumError>;
