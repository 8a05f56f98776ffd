//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (database, channel, etc.).
//! A duplicate key is not an error; see [`WriteOutcome`](super::WriteOutcome).

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to send command to writer actor.
    #[error("failed to send command to writer actor")]
    ChannelSend,

    /// Writer actor dropped the reply channel.
    #[error("writer actor did not reply")]
    ChannelRecv,

    /// Internal error (e.g., task join failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid data in database (e.g., a row that fails reading validation).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
