//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while constructing or validating job payloads.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    #[error("Invalid duration: {0}")]
    InvalidDuration(f64),

    #[error("Proxy job requires at least one resolution")]
    EmptyResolutions,

    #[error("Thumbnail job requires at least one size")]
    EmptySizes,

    #[error("Unknown job kind: {0}")]
    UnknownKind(String),
}
