//! Error hierarchy for the release notification pipeline.
//!
//! Errors are grouped by the layer that produced them so callers can decide
//! between retrying (transient network/storage failures), surfacing
//! immediately (not-found, malformed input) and aborting (fatal startup
//! failures).

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Client side configuration retrieval failures
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Rejected request payloads, never retried
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Failed to send shutdown signal: {0}")]
    SignalSenderClosed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Transport level failure talking to a remote endpoint
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: Box<reqwest::Error>,
    },

    /// Remote endpoint answered with a status the caller does not handle
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Operation did not complete in time
    #[error("Request to {url} timed out after {duration:?}")]
    Timeout { url: String, duration: Duration },

    /// Malformed endpoint addresses
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP listener could not be bound
    #[error("Failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    /// Retry policy exhaustion
    #[error("Task failed after {retries} retries: {reason}")]
    RetryExhausted { retries: usize, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// I/O failure bound to a concrete path
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Release log is not reachable
    #[error("Release log unavailable: {0}")]
    LogUnavailable(String),

    /// Error type for value conversion operations
    #[error("Value convert failed: {0}")]
    Convert(#[from] ConvertError),
}

/// Error type for value conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// This occurs when the input byte slice length doesn't match the required 8 bytes.
    #[error("invalid byte length: expected 8 bytes, received {0} bytes")]
    InvalidLength(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The namespace has no release on the server
    #[error("Could not find config for namespace - appId: {app_id}, cluster: {cluster}, namespace: {namespace}, please check whether the configs are released")]
    NotFound {
        app_id: String,
        cluster: String,
        namespace: String,
    },

    /// Service discovery returned no endpoint
    #[error("No available config service")]
    NoServiceAvailable,

    /// Every server and every retry pass failed
    #[error("Load config failed - appId: {app_id}, cluster: {cluster}, namespace: {namespace}, url: {url:?}, reason: {reason}")]
    LoadFailed {
        app_id: String,
        cluster: String,
        namespace: String,
        url: Option<String>,
        reason: String,
    },

    /// The local durable cache cannot serve the namespace
    #[error("Load config from local cache file {path} failed: {reason}")]
    LocalCache { path: PathBuf, reason: String },

    /// Meta service lookup failure
    #[error("Get config services failed from {url}: {reason}")]
    MetaService { url: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidInputError {
    #[error("Invalid watch key: {0}")]
    WatchKey(String),

    #[error("Invalid format of notifications: {0}")]
    Notifications(String),
}

impl Error {
    /// HTTP status carried by the error, if it came from a remote response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::System(SystemError::Network(NetworkError::UnexpectedStatus { status, .. })) => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Client(ClientError::NotFound { .. })) || self.status_code() == Some(404)
    }
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<ConvertError> for Error {
    fn from(e: ConvertError) -> Self {
        Error::System(SystemError::Storage(StorageError::Convert(e)))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        SerializationError::Bincode(err).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json(err).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        SystemError::TaskFailed(err).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err).into()
    }
}
