//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
///
/// Only [`SessionError::StoreUnavailable`] is meant to reach the request
/// layer. Corrupt payloads and malformed identifiers are recovered inside
/// [`SessionManager`](crate::manager::SessionManager) by starting a fresh
/// session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing database could not be reached or rejected the operation
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored payload bytes could not be decoded
    #[error("Corrupt session payload: {0}")]
    CorruptPayload(String),

    /// Identifier does not match the session id format
    #[error("Invalid session ID: {0}")]
    InvalidIdentifier(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SessionError {
    /// Whether this error came from the storage layer.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, SessionError::StoreUnavailable(_))
    }

    /// Whether the lifecycle manager recovers from this error locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::CorruptPayload(_) | SessionError::InvalidIdentifier(_)
        )
    }
}

#[cfg(feature = "couchdb")]
impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::StoreUnavailable(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::StoreUnavailable(err.to_string())
    }
}
