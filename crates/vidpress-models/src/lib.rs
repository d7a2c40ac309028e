//! Shared data models for the vidpress compression service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job identity and lifecycle states
//! - Compression requests from the upstream CMS
//! - Quality presets and the encoding ladder
//! - The on-disk media layout and public URL scheme
//! - Terminal result records and webhook events

pub mod error_kind;
pub mod job;
pub mod layout;
pub mod limits;
pub mod quality;
pub mod request;
pub mod result;
pub mod video;
pub mod webhook;

pub use error_kind::ErrorKind;
pub use job::{Job, JobId, JobState};
pub use layout::MediaLayout;
pub use limits::{
    is_allowed_codec, is_allowed_container, clamp_segment_duration, DEFAULT_THUMBNAIL_QUALITY,
    MAX_DURATION_SECS, MAX_IMAGE_FETCH_BYTES, MAX_SOURCE_BYTES, MIN_IMAGE_FETCH_BYTES,
    MIN_VIDEO_FETCH_BYTES,
};
pub use quality::{Quality, QualityPreset};
pub use request::CompressionRequest;
pub use result::{JobResult, JobStats, QualityStat};
pub use video::{QueueStats, ValidationResult, VideoInfo};
pub use webhook::{WebhookEvent, WebhookPayload};
