//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a hash store.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The connection could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server did not answer within the socket timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// No server answers at the configured address.
    #[error("server unreachable at {host}:{port}")]
    Unreachable {
        /// Host that was dialed.
        host: String,
        /// Port that was dialed.
        port: u16,
    },

    /// The server rejected a command.
    #[error("backend error: {0}")]
    Backend(String),

    /// The handle was closed.
    #[error("store is closed")]
    Closed,
}

impl StorageError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true for failures that may go away on a fresh attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Unreachable { .. }
        )
    }
}

#[cfg(feature = "redis")]
impl From<::redis::RedisError> for StorageError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error()
        {
            Self::Connection(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
