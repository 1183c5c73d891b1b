use std::io;
use std::path::PathBuf;

/// Errors produced by the storage engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// I/O error from the WAL or checkpoint files.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A view extension was read before it was registered.
    #[error("extension not registered: {0}")]
    MissingExtension(String),

    /// An extension depends on another extension that is not registered.
    #[error("extension '{name}' depends on unregistered extension '{dependency}'")]
    MissingDependency { name: String, dependency: String },

    /// An extension failed to maintain its index.
    #[error("extension '{name}' failed: {reason}")]
    Extension { name: String, reason: String },

    /// The checkpoint file exists but cannot be used.
    #[error("corrupt checkpoint at {path}: {reason}")]
    CorruptCheckpoint { path: PathBuf, reason: String },

    /// The store directory path exists but is not a directory.
    #[error("store path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Convenience alias used throughout the engine crate.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
