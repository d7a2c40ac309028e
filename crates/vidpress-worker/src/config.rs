//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vidpress_models::{clamp_segment_duration, DEFAULT_THUMBNAIL_QUALITY};

/// Worker configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs; also the per-second claim rate
    pub concurrency: usize,
    /// Root for source uploads (local-first download policy)
    pub uploads_root: PathBuf,
    /// Root for produced media
    pub content_root: PathBuf,
    /// Public URL prefix for produced media
    pub base_url: String,
    /// HLS segment duration, clamped to [2, 3] seconds
    pub segment_secs: u32,
    /// Thumbnail encode quality [0..100]
    pub thumbnail_quality: u8,
    /// Thumbnail bounding box
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    /// Comma-separated download allowlist (`*` wildcard supported)
    pub allowed_download_domains: String,
    /// Verify TLS certificates on downloads
    pub verify_ssl_downloads: bool,
    /// Graceful shutdown budget for in-flight jobs
    pub shutdown_timeout: Duration,
    /// How often the delayed set is promoted
    pub promote_interval: Duration,
    /// How often stalled entries are reclaimed
    pub reclaim_interval: Duration,
    /// Ownership refresh interval for in-flight jobs
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            uploads_root: PathBuf::from("/var/media/uploads"),
            content_root: PathBuf::from("/var/media/content"),
            base_url: "http://localhost:8000".to_string(),
            segment_secs: 2,
            thumbnail_quality: DEFAULT_THUMBNAIL_QUALITY,
            thumbnail_max_width: 1280,
            thumbnail_max_height: 720,
            allowed_download_domains: String::new(),
            verify_ssl_downloads: true,
            shutdown_timeout: Duration::from_secs(30),
            promote_interval: Duration::from_secs(5),
            reclaim_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: std::env::var("PARALLEL_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            uploads_root: std::env::var("MEDIA_UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_root),
            content_root: std::env::var("MEDIA_CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.content_root),
            base_url: std::env::var("BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            segment_secs: clamp_segment_duration(
                std::env::var("HLS_TIME")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.segment_secs),
            ),
            thumbnail_quality: std::env::var("THUMBNAIL_QUALITY")
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .map(|q| q.min(100))
                .unwrap_or(defaults.thumbnail_quality),
            thumbnail_max_width: std::env::var("THUMBNAIL_MAX_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.thumbnail_max_width),
            thumbnail_max_height: std::env::var("THUMBNAIL_MAX_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.thumbnail_max_height),
            allowed_download_domains: std::env::var("ALLOWED_DOWNLOAD_DOMAINS")
                .unwrap_or(defaults.allowed_download_domains),
            verify_ssl_downloads: std::env::var("VERIFY_SSL_DOWNLOADS")
                .map(|s| s.to_lowercase() != "false" && s != "0")
                .unwrap_or(defaults.verify_ssl_downloads),
            ..defaults
        }
    }

    /// Restart backoff for the supervisor: `min(5 s × 2^k, 60 s)`.
    pub fn restart_delay(consecutive_failures: u32) -> Duration {
        let shift = consecutive_failures.min(4);
        Duration::from_secs(5 << shift).min(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_delay_doubles_and_caps_at_sixty() {
        assert_eq!(WorkerConfig::restart_delay(0), Duration::from_secs(5));
        assert_eq!(WorkerConfig::restart_delay(1), Duration::from_secs(10));
        assert_eq!(WorkerConfig::restart_delay(2), Duration::from_secs(20));
        assert_eq!(WorkerConfig::restart_delay(3), Duration::from_secs(40));
        assert_eq!(WorkerConfig::restart_delay(4), Duration::from_secs(60));
        assert_eq!(WorkerConfig::restart_delay(10), Duration::from_secs(60));
    }

    #[test]
    fn defaults_are_single_threaded() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.segment_secs, 2);
        assert_eq!(config.thumbnail_quality, 60);
    }
}
