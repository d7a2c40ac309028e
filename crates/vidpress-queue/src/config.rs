//! Broker configuration.

use std::time::Duration;

/// Broker client configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for pending jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Sorted set holding jobs in retry backoff
    pub delayed_set: String,
    /// Maximum attempts per job
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff
    pub retry_base: Duration,
    /// Idle time after which a claimed job counts as stalled
    pub stall_window: Duration,
    /// End-to-end budget for a single enqueue
    pub enqueue_timeout: Duration,
    /// How long terminal job records are retained
    pub terminal_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vp:jobs".to_string(),
            consumer_group: "vp:workers".to_string(),
            delayed_set: "vp:delayed".to_string(),
            max_attempts: 3,
            retry_base: Duration::from_secs(5),
            stall_window: Duration::from_secs(60),
            enqueue_timeout: Duration::from_secs(15),
            terminal_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables.
    ///
    /// The Redis URL is assembled from `REDIS_HOST`, `REDIS_PORT`,
    /// `REDIS_PASSWORD` and `REDIS_DATABASE`.
    pub fn from_env() -> Self {
        Self {
            redis_url: redis_url_from_env(),
            max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            stall_window: Duration::from_secs(
                std::env::var("QUEUE_STALL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            ..Default::default()
        }
    }

    /// Retry backoff for a failed attempt: `5s × 2^(attempt-1)`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.retry_base.saturating_mul(1 << shift)
    }
}

fn redis_url_from_env() -> String {
    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    let database = std::env::var("REDIS_DATABASE").unwrap_or_else(|_| "0".to_string());
    match std::env::var("REDIS_PASSWORD") {
        Ok(password) if !password.is_empty() => {
            format!("redis://:{}@{}:{}/{}", password, host, port, database)
        }
        _ => format!("redis://{}:{}/{}", host, port, database),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_from_five_seconds() {
        let config = BrokerConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(5));
        assert_eq!(config.retry_delay(2), Duration::from_secs(10));
        assert_eq!(config.retry_delay(3), Duration::from_secs(20));
        // attempt 0 behaves like the first
        assert_eq!(config.retry_delay(0), Duration::from_secs(5));
    }
}
