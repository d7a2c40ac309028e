//! Application state.

use std::sync::Arc;
use std::time::Instant;

use vidpress_queue::Broker;

use crate::config::ApiConfig;

/// Shared application state; the composition root wires it once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub broker: Arc<Broker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, broker: Broker) -> Self {
        Self {
            config: Arc::new(config),
            broker: Arc::new(broker),
            started_at: Instant::now(),
        }
    }
}
