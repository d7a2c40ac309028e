//! Probe results, validation outcome and queue counters.

use serde::{Deserialize, Serialize};

use crate::error_kind::ErrorKind;

/// Metadata extracted from a source container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Video codec name
    pub video_codec: String,
    /// Audio codec name, if an audio stream exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Container format
    pub container: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Overall bitrate in bits/second
    pub bitrate: u64,
    /// Frame rate (fps)
    pub fps: f64,
    /// File size in bytes
    pub size: u64,
}

/// Outcome of source validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Human-readable messages in check order
    pub errors: Vec<String>,
    /// First failing machine-readable kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            kind: None,
        }
    }

    /// Record a violation; the first one fixes the kind.
    pub fn push(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
        if self.kind.is_none() {
            self.kind = Some(kind);
        }
    }
}

/// Queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_violation_fixes_the_kind() {
        let mut result = ValidationResult::ok();
        result.push(ErrorKind::DurationTooLong, "duration 301.0s exceeds 300s");
        result.push(ErrorKind::FileTooLarge, "file too large");

        assert!(!result.valid);
        assert_eq!(result.kind, Some(ErrorKind::DurationTooLong));
        assert_eq!(result.errors.len(), 2);
    }
}
