use kestrel_training::JobError;
use thiserror::Error;

/// Broker-level failures. Unlike [`JobError`] these are fatal for the worker:
/// a job whose outcome cannot be published or acknowledged must not be
/// silently dropped.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("failed to declare queue {queue}: {reason}")]
    QueueDeclare { queue: String, reason: String },

    #[error("failed to consume from {queue}: {reason}")]
    Consume { queue: String, reason: String },

    #[error("failed to publish to {queue}: {reason}")]
    Publish { queue: String, reason: String },

    #[error("failed to acknowledge delivery {delivery_tag}: {reason}")]
    Ack { delivery_tag: u64, reason: String },

    #[error("failed to encode outcome: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors raised while loading or validating [`crate::WorkerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse configuration file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Failures of the storage service client.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {url}: {reason}")]
    Response { url: String, reason: String },

    #[error("failed to read local file {path}: {reason}")]
    LocalFile { path: String, reason: String },
}

impl StorageError {
    /// Map a failed image fetch into the job taxonomy.
    #[must_use]
    pub fn into_download(self) -> JobError {
        JobError::Download(self.to_string())
    }

    /// Map a failed model upload into the job taxonomy.
    #[must_use]
    pub fn into_upload(self) -> JobError {
        JobError::Upload(self.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
