//! Error types for the queue system.

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur when submitting a job to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue has been stopped and no longer accepts jobs.
    #[error("Queue has been stopped")]
    Stopped,

    /// The queue's job channel is at capacity.
    #[error("Queue is full")]
    Full,
}
