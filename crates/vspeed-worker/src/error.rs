//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stage failed: {0}")]
    StageFailed(String),

    #[error("Failed to read {path}: {message}")]
    ArtifactRead { path: PathBuf, message: String },

    #[error("Media error: {0}")]
    Media(#[from] vspeed_media::MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn stage_failed(msg: impl Into<String>) -> Self {
        Self::StageFailed(msg.into())
    }

    pub fn artifact_read(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::ArtifactRead {
            path: path.into(),
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_converts() {
        let err = WorkerError::from(vspeed_media::MediaError::Timeout(5));
        assert!(matches!(err, WorkerError::Media(_)));
        assert_eq!(err.to_string(), "Media error: Operation timed out after 5 seconds");
    }

    #[test]
    fn test_display() {
        let err = WorkerError::artifact_read("/out/fragments.json", "missing field");
        assert_eq!(
            err.to_string(),
            "Failed to read /out/fragments.json: missing field"
        );
    }
}
