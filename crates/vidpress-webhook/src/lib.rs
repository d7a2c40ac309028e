//! Webhook delivery back to the upstream CMS.
//!
//! This crate provides:
//! - A dispatcher that POSTs events with bounded retries
//! - A per-job throttler that collapses bursty progress events

pub mod dispatcher;
pub mod error;
pub mod throttle;

pub use dispatcher::{DispatchOutcome, WebhookConfig, WebhookDispatcher};
pub use error::{WebhookError, WebhookResult};
pub use throttle::ProgressThrottle;
