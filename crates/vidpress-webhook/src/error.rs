//! Webhook error types.

use thiserror::Error;

pub type WebhookResult<T> = Result<T, WebhookError>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    DeliveryFailed { attempts: u32, last_error: String },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
