//! Worker error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] mediaflow_models::ModelError),

    #[error("Source download failed: {0}")]
    DownloadFailed(#[source] mediaflow_storage::StorageError),

    #[error("Expected output missing: {0}")]
    MissingOutput(PathBuf),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] mediaflow_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] mediaflow_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] mediaflow_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn download_failed(err: mediaflow_storage::StorageError) -> Self {
        Self::DownloadFailed(err)
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Invalid payloads and configuration problems will fail the same way on
    /// every delivery; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WorkerError::InvalidJob(_) | WorkerError::ConfigError(_) | WorkerError::Json(_)
        )
    }
}
