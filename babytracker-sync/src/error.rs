//! Error types for the sync layer.

use babytracker_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A single line exceeded the byte ceiling.
    #[error("message exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// A message carried more records than allowed.
    #[error("too many {what}: {count} > {limit}")]
    LimitExceeded {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    /// Timeout.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The peer closed the connection before a full message arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Service advertisement or browsing failed.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// A spawned task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true if the peer sent more than the configured limits allow.
    pub fn is_oversized(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. } | Self::LimitExceeded { .. })
    }
}
