use std::io;

use vellum_engine::EngineError;
use vellum_view::ViewError;

/// Errors raised while creating observers.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A delivery or observation thread could not be started.
    #[error("failed to start {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: io::Error,
    },

    /// The observation hub has been shut down.
    #[error("observation hub is shut down")]
    Closed,
}

pub type ObserveResult<T> = std::result::Result<T, ObserveError>;
