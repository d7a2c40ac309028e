//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Job already queued for post {0}")]
    AlreadyQueued(u64),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Connection-level failures are transient for callers; a job fails only
    /// when its pipeline returns an error or attempts are exhausted.
    pub fn is_connection(&self) -> bool {
        match self {
            QueueError::Unavailable(_) => true,
            QueueError::Redis(e) => {
                e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() || e.is_io_error()
            }
            _ => false,
        }
    }
}
