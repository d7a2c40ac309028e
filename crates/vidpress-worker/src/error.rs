//! Worker error types.

use std::fmt;
use thiserror::Error;

use vidpress_models::ErrorKind;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Media root not writable: {0}")]
    MediaRootUnwritable(String),

    #[error("Queue error: {0}")]
    Queue(#[from] vidpress_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] vidpress_media::MediaError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] vidpress_webhook::WebhookError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }
}

/// A failed pipeline attempt: classification plus the human-readable cause.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Fatal failures skip the retry policy.
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<vidpress_media::MediaError> for PipelineFailure {
    fn from(e: vidpress_media::MediaError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_carries_kind_and_message() {
        let failure = PipelineFailure::new(ErrorKind::InvalidCodec, "codec 'wmv2' not allowed");
        assert_eq!(failure.to_string(), "INVALID_CODEC: codec 'wmv2' not allowed");
        assert!(failure.is_fatal());
    }
}
