//! The closed set of pipeline error kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error classification carried through the pipeline,
/// the API and webhook payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FileNotFound,
    FileTooLarge,
    DurationTooLong,
    InvalidCodec,
    InvalidContainer,
    VideoCorrupted,
    DownloadFailed,
    DownloadRejected,
    TranscodeFailed,
    BrokerUnavailable,
    Unauthorized,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    RateLimited,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::DurationTooLong => "DURATION_TOO_LONG",
            ErrorKind::InvalidCodec => "INVALID_CODEC",
            ErrorKind::InvalidContainer => "INVALID_CONTAINER",
            ErrorKind::VideoCorrupted => "VIDEO_CORRUPTED",
            ErrorKind::DownloadFailed => "DOWNLOAD_FAILED",
            ErrorKind::DownloadRejected => "DOWNLOAD_REJECTED",
            ErrorKind::TranscodeFailed => "TRANSCODE_FAILED",
            ErrorKind::BrokerUnavailable => "BROKER_UNAVAILABLE",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Fatal kinds fail the attempt immediately; the error is deterministic
    /// and a retry cannot change the outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::FileNotFound
                | ErrorKind::FileTooLarge
                | ErrorKind::DurationTooLong
                | ErrorKind::InvalidCodec
                | ErrorKind::InvalidContainer
                | ErrorKind::VideoCorrupted
                | ErrorKind::DownloadRejected
                | ErrorKind::Validation
                | ErrorKind::Unauthorized
        )
    }

    /// Recoverable kinds feed the broker's retry policy.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_family_is_fatal() {
        assert!(ErrorKind::InvalidCodec.is_fatal());
        assert!(ErrorKind::DurationTooLong.is_fatal());
        assert!(ErrorKind::DownloadRejected.is_fatal());
    }

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ErrorKind::DownloadFailed.is_retryable());
        assert!(ErrorKind::TranscodeFailed.is_retryable());
        assert!(ErrorKind::BrokerUnavailable.is_retryable());
    }

    #[test]
    fn serde_uses_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::DownloadRejected).unwrap();
        assert_eq!(json, "\"DOWNLOAD_REJECTED\"");
    }
}
