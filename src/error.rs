use thiserror::Error;

/// Result type alias using `FxError`.
pub type Result<T> = std::result::Result<T, FxError>;

/// Errors surfaced by the effects pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum FxError {
    /// Invalid stage parameters, raised when a stage is constructed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Source audio could not be read or is corrupt.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Pitch-shift / time-stretch backend failure.
    #[error("Processing error: {0}")]
    Processing(String),

    /// The enclosing render task was cancelled before it finished.
    #[error("Render cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FxError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        FxError::Configuration(msg.into())
    }

    pub(crate) fn processing(msg: impl Into<String>) -> Self {
        FxError::Processing(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        FxError::Decode(msg.into())
    }
}
