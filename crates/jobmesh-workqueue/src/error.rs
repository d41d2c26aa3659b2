//! Queue errors.

use thiserror::Error;

/// Broker error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem error of the file backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Ack or nack of a delivery the broker does not know.
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(String),

    /// The broker no longer accepts operations.
    #[error("Queue is closed")]
    Closed,

    /// Any other broker failure.
    #[error("{0}")]
    Backend(String),
}
