use vellum_engine::EngineError;

/// Errors raised while registering or reading views.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The materialized index holds a group the view does not declare.
    #[error("view '{view}' has items in undeclared group '{group}'")]
    InconsistentMapping { view: String, group: String },
}

pub type ViewResult<T> = std::result::Result<T, ViewError>;
