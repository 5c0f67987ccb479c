//! Error types for the MessageBird core.

/// Core error type for MessageBird infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum MessageBirdError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for MessageBird operations.
pub type MessageBirdResult<T> = Result<T, MessageBirdError>;
