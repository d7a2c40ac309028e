//! Media toolkit: thin wrappers over ffmpeg/ffprobe plus image and fetch
//! helpers.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress from `-progress pipe:2`
//! - Container probing with corruption flags
//! - The fixed-ladder transcode contract
//! - HLS segmentation and master playlist rendering/parsing
//! - Inside-fit WebP thumbnail encoding
//! - An SSRF-guarded HTTP fetcher

pub mod command;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod probe;
pub mod progress;
pub mod transcode;
pub mod webp_image;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fetch::{FetchKind, FetchPolicy, Fetcher};
pub use hls::{segment, MasterPlaylist, SegmentOutcome, Variant};
pub use probe::probe_video;
pub use progress::FfmpegProgress;
pub use transcode::{transcode, TranscodeOutcome};
pub use webp_image::{resize_to_webp, WebpOptions, WebpOutcome};
