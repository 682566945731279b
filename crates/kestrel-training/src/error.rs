use std::path::PathBuf;
use thiserror::Error;

pub type JobResult<T> = std::result::Result<T, JobError>;

/// Job-scoped failures. Every variant ends the job with a Failure outcome;
/// none of them is retried and none of them stops the worker.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download error: {0}")]
    Download(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("upload error: {0}")]
    Upload(String),
}

impl JobError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the failure category.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientData(_) => "insufficient_data",
            Self::Filesystem { .. } => "filesystem",
            Self::Download(_) => "download",
            Self::Training(_) => "training",
            Self::Upload(_) => "upload",
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_mentions_path() {
        let err = JobError::filesystem(
            "/tmp/datasets/abc",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/datasets/abc"));
        assert!(msg.contains("denied"));
        assert_eq!(err.kind(), "filesystem");
    }

    #[test]
    fn test_json_error_is_invalid_input() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: JobError = parse_err.into();
        assert!(matches!(err, JobError::InvalidInput(_)));
    }
}
