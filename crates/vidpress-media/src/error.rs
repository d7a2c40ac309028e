//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use vidpress_models::ErrorKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Corrupted video: {0}")]
    Corrupted(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Download rejected: {0}")]
    DownloadRejected(String),

    #[error("Image processing failed: {0}")]
    ImageFailed(String),

    #[error("Invalid playlist: {0}")]
    InvalidPlaylist(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed(message.into())
    }

    pub fn download_rejected(message: impl Into<String>) -> Self {
        Self::DownloadRejected(message.into())
    }

    /// Machine-readable classification for the pipeline.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::FileNotFound(_) => ErrorKind::FileNotFound,
            MediaError::Corrupted(_) => ErrorKind::VideoCorrupted,
            MediaError::DownloadFailed(_) => ErrorKind::DownloadFailed,
            MediaError::DownloadRejected(_) => ErrorKind::DownloadRejected,
            MediaError::FfmpegFailed { .. } | MediaError::Timeout(_) => ErrorKind::TranscodeFailed,
            _ => ErrorKind::Internal,
        }
    }
}
