//! Error types for offline mixdown

use thiserror::Error;

/// Mixdown errors
#[derive(Error, Debug)]
pub enum MixError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Encoder state error: {0}")]
    EncoderState(String),

    #[error("Pipeline busy: a mix is already running ({0})")]
    Busy(String),

    #[error("Mix cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error reported by a pipeline run
pub type PipelineError = MixError;

/// Result type for mixdown operations
pub type MixResult<T> = Result<T, MixError>;
