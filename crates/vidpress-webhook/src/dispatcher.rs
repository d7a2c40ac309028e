//! Outbound webhook dispatch.

use std::time::Duration;

use tracing::{debug, info, warn};

use vidpress_models::WebhookEvent;

use crate::error::{WebhookError, WebhookResult};
use crate::throttle::ProgressThrottle;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Callback endpoint; `None` disables delivery entirely
    pub endpoint: Option<String>,
    /// Shared secret sent in `X-API-Key`
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Delivery attempts per event
    pub max_attempts: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl WebhookConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("WORDPRESS_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Linear backoff: `attempt × 2 s`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt) * 2)
    }
}

/// What happened to an event handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// Suppressed by the progress throttler
    Throttled,
    /// No endpoint configured
    Disabled,
}

/// Stateless dispatcher, except for the per-job progress throttler.
pub struct WebhookDispatcher {
    config: WebhookConfig,
    client: reqwest::Client,
    throttle: ProgressThrottle,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> WebhookResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            throttle: ProgressThrottle::new(),
        })
    }

    pub fn from_env() -> WebhookResult<Self> {
        Self::new(WebhookConfig::from_env())
    }

    /// Send one event, applying the throttler to progress events.
    ///
    /// Completion and failure events always send and evict the job's
    /// throttler entry.
    pub async fn send(&self, event: &WebhookEvent) -> WebhookResult<DispatchOutcome> {
        if event.is_terminal() {
            self.throttle.clear(&event.job_id);
        }

        let Some(endpoint) = self.config.endpoint.as_deref() else {
            return Ok(DispatchOutcome::Disabled);
        };

        if !event.is_terminal() && !self.throttle.should_send(&event.job_id, event.progress) {
            debug!(job_id = %event.job_id, progress = event.progress, "Progress event throttled");
            return Ok(DispatchOutcome::Throttled);
        }

        self.deliver(endpoint, event).await?;
        Ok(DispatchOutcome::Delivered)
    }

    async fn deliver(&self, endpoint: &str, event: &WebhookEvent) -> WebhookResult<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            let result = self
                .client
                .post(endpoint)
                .header("X-API-Key", &self.config.api_key)
                .json(event)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    info!(
                        job_id = %event.job_id,
                        status = %event.status,
                        progress = event.progress,
                        attempt,
                        "Webhook delivered"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.config.max_attempts {
                let backoff = self.config.backoff(attempt);
                warn!(
                    job_id = %event.job_id,
                    attempt,
                    error = %last_error,
                    "Webhook attempt failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }

        warn!(job_id = %event.job_id, error = %last_error, "Webhook delivery failed");
        Err(WebhookError::DeliveryFailed {
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidpress_models::{CompressionRequest, Job, WebhookEvent};

    fn job() -> Job {
        Job::new(CompressionRequest {
            post_id: 42,
            media_path: "/uploads/clip.mp4".to_string(),
            video_url: None,
            thumbnail_path: None,
            thumbnail_url: None,
            post_url: None,
            year: 2025,
            month: 1,
        })
    }

    #[test]
    fn backoff_is_linear() {
        let config = WebhookConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(2));
        assert_eq!(config.backoff(2), Duration::from_secs(4));
        assert_eq!(config.backoff(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn no_endpoint_is_a_noop_success() {
        let dispatcher = WebhookDispatcher::new(WebhookConfig::default()).unwrap();
        let event = WebhookEvent::progress(&job(), 25, "validating");
        assert_eq!(
            dispatcher.send(&event).await.unwrap(),
            DispatchOutcome::Disabled
        );
    }

    #[tokio::test]
    async fn terminal_event_clears_the_throttle_entry() {
        let dispatcher = WebhookDispatcher::new(WebhookConfig::default()).unwrap();
        let j = job();

        // Seed a throttle entry, then observe a terminal event evict it even
        // though delivery is disabled.
        dispatcher.throttle.should_send(&j.id, 50);
        assert_eq!(dispatcher.throttle.len(), 1);

        let event = WebhookEvent::failure(&j, "boom");
        dispatcher.send(&event).await.unwrap();
        assert!(dispatcher.throttle.is_empty());
    }
}
