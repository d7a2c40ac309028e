//! Durable job queue over Redis Streams.
//!
//! This crate provides:
//! - Job enqueueing with post-scoped deduplication
//! - Worker consumption via a consumer group, with stall reclaim
//! - A delayed set for exponential-backoff retries
//! - Lifecycle events via Redis Pub/Sub

pub mod broker;
pub mod config;
pub mod error;
pub mod events;

pub use broker::{Broker, ClaimedJob, EnqueueOutcome, FinalizeOutcome};
pub use config::BrokerConfig;
pub use error::{QueueError, QueueResult};
pub use events::QueueEvent;
