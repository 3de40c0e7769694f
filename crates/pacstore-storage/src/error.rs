//! Storage error taxonomy
//!
//! Every adapter translates its transport errors into [`StorageError`] at the
//! adapter boundary. Callers only ever see these kinds.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source file not found: {}", .0.display())]
    SourceFileNotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A streamed upload was aborted and its partial data discarded.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Flat view of [`StorageError`] for callers that branch on the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    BackendUnavailable,
    Cancelled,
    Config,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StorageError::NotFound(_) | StorageError::SourceFileNotFound(_) => ErrorKind::NotFound,
            StorageError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StorageError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            StorageError::Cancelled(_) => ErrorKind::Cancelled,
            StorageError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether a caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::BackendUnavailable
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Translate an I/O error raised while working on `target`.
    pub(crate) fn from_io(err: io::Error, target: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(target.to_string()),
            io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(format!("{}: {}", target, err))
            }
            _ => StorageError::BackendUnavailable(format!("{}: {}", target, err)),
        }
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        use object_store::Error as ObjectStoreError;

        match err {
            ObjectStoreError::NotFound { path, .. } => StorageError::NotFound(path),
            ObjectStoreError::InvalidPath { source } => {
                StorageError::InvalidArgument(source.to_string())
            }
            ObjectStoreError::PermissionDenied { path, source } => {
                StorageError::PermissionDenied(format!("{}: {}", path, source))
            }
            ObjectStoreError::Unauthenticated { path, source } => {
                StorageError::PermissionDenied(format!("{}: {}", path, source))
            }
            other => StorageError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<object_store::path::Error> for StorageError {
    fn from(err: object_store::path::Error) -> Self {
        StorageError::InvalidArgument(err.to_string())
    }
}
