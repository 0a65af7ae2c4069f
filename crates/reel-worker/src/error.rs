//! Worker error types.

use thiserror::Error;

use reel_media::MediaError;
use reel_models::InputError;
use reel_publish::PublishError;
use reel_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

pub type SourceResult<T> = Result<T, SourceError>;

/// Content source and photo download errors.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Unexpected response body: {0}")]
    InvalidBody(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    pub fn invalid_body(msg: impl Into<String>) -> Self {
        Self::InvalidBody(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http(_) => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Errors caught at the per-item boundary.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid item: {0}")]
    Input(#[from] InputError),

    #[error("Render failed: {0}")]
    Render(#[source] MediaError),

    #[error("Encode failed: {0}")]
    Encode(#[source] MediaError),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Content source error: {0}")]
    Source(#[from] SourceError),

    #[error("Publish setup error: {0}")]
    Publish(#[from] PublishError),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Pipeline stage the error belongs to, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            WorkerError::Input(_) => "input",
            WorkerError::Render(_) => "render",
            WorkerError::Encode(_) => "encode",
            WorkerError::Upload(_) => "upload",
            WorkerError::Source(_) => "source",
            WorkerError::Publish(_) => "publish",
            WorkerError::Ledger(_) => "ledger",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Cancelled => "cancelled",
            WorkerError::Io(_) => "io",
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Upload(e) => e.is_retryable(),
            WorkerError::Source(e) => e.is_retryable(),
            WorkerError::Encode(e) => e.is_retryable(),
            WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(WorkerError::Input(InputError::MissingId).stage(), "input");
        assert_eq!(
            WorkerError::Render(MediaError::render("no font")).stage(),
            "render"
        );
        assert_eq!(WorkerError::Cancelled.stage(), "cancelled");
    }

    #[test]
    fn test_source_retryable() {
        let err = SourceError::Status {
            status: 503,
            url: "https://example.com".to_string(),
        };
        assert!(err.is_retryable());
        let err = SourceError::Status {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(!WorkerError::Input(InputError::MissingId).is_retryable());
        assert!(WorkerError::Upload(StorageError::upload_failed("connection reset")).is_retryable());
        assert!(!WorkerError::Render(MediaError::render("no font")).is_retryable());
    }
}
