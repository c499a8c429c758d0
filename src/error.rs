//! Error types for the Gazette issue store.

use crate::types::{DatasetId, IssueId};
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object directory has no readable primary file. Index loads skip the object.
    #[error("Missing primary file: {0}")]
    MissingPrimaryFile(PathBuf),

    /// A structured field file could not be parsed. Isolated to one object.
    #[error("Malformed field '{field}' in {path}: {reason}")]
    MalformedField {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("Filesystem failure at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Object already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    #[error("Unknown field '{field}' for collection {collection}")]
    UnknownField { collection: String, field: String },
}

impl StorageError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Version-control synchronization errors.
///
/// Each variant is a distinct user-facing status; none of them collapse into a generic failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("local history has diverged from the remote branch '{branch}'")]
    Diverged { branch: String },

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("repository is not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("no remote URL configured")]
    NoRemote,

    #[error("operation cancelled")]
    Cancelled,

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("sync worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Whether retrying the same operation may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable(_) | SyncError::PushRejected(_) | SyncError::Cancelled
        )
    }
}

/// Errors raised while applying dataset change lists.
#[derive(Debug, Error)]
pub enum AmendmentError {
    #[error("Malformed change #{index} for dataset {dataset}: {reason}")]
    MalformedChange {
        dataset: DatasetId,
        index: usize,
        reason: String,
    },

    #[error("Dataset {0} has contents that do not match its schema shape")]
    ShapeMismatch(DatasetId),
}

/// API-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Issue not found: {0}")]
    IssueNotFound(IssueId),

    #[error("Issue already scheduled: {0}")]
    IssueExists(IssueId),

    #[error("Message index {index} out of range for issue {issue}")]
    MessageNotFound { issue: IssueId, index: usize },

    #[error("Publication {publication} is not annexed in issue {issue}")]
    AnnexNotFound { issue: IssueId, publication: String },

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),

    #[error("Amendment error: {0}")]
    AmendmentError(#[from] AmendmentError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
