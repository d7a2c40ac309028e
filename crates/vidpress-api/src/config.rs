//! API configuration.

use std::path::PathBuf;

/// API server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Shared secret expected in `X-API-Key`
    pub api_key: String,
    /// CORS origins (`*` for permissive)
    pub cors_origins: Vec<String>,
    /// Token-bucket capacity per client IP
    pub rate_limit_requests: u32,
    /// Token-bucket window in seconds
    pub rate_limit_window_secs: u64,
    /// Root for produced media served under `/content`
    pub content_root: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: String::new(),
            cors_origins: vec!["*".to_string()],
            rate_limit_requests: 100,
            rate_limit_window_secs: 60,
            content_root: PathBuf::from("/var/media/content"),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            cors_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_requests: std::env::var("RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_requests),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_window_secs),
            content_root: std::env::var("MEDIA_CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.content_root),
        }
    }
}
