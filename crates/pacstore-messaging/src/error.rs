use thiserror::Error;

/// Messaging operation errors
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
