//! Unified Error Model
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Bad input; the run is never attempted.
    #[error("CONFIG/{0}")]
    Configuration(String),

    #[error("STAGE/unsupported stage '{0}'")]
    UnsupportedStage(String),

    #[error("NOT_FOUND/{0}")]
    NotFound(String),

    #[error("CONFLICT/{0}")]
    Conflict(String),

    #[error("TIMEOUT/{0}")]
    Timeout(String),

    /// Underlying storage failed (I/O, corrupt data, serialization).
    #[error("STORAGE/{0}")]
    Storage(String),
}

impl PipelineError {
    /// Errors raised before any I/O; these reach the caller directly instead
    /// of being folded into a failed result.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnsupportedStage(_))
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {}", err))
    }
}
