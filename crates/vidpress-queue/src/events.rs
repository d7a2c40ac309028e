//! Lifecycle events via Redis Pub/Sub.

use serde::{Deserialize, Serialize};

use vidpress_models::JobId;

/// Channel carrying lifecycle events for logging/inspection.
pub const EVENTS_CHANNEL: &str = "vp:events";

/// A queue lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Enqueued and waiting for a worker
    Waiting { job_id: JobId },
    /// Claimed by a worker
    Active { job_id: JobId },
    /// Terminal success
    Completed { job_id: JobId },
    /// Terminal failure
    Failed { job_id: JobId, error: String },
    /// Claimed job lost its heartbeat and was reclaimed
    Stalled { job_id: JobId },
}

impl QueueEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueEvent::Waiting { job_id }
            | QueueEvent::Active { job_id }
            | QueueEvent::Completed { job_id }
            | QueueEvent::Failed { job_id, .. }
            | QueueEvent::Stalled { job_id } => job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serde_is_tagged() {
        let event = QueueEvent::Failed {
            job_id: JobId::from_string("job_42_1700000000000"),
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "failed");
        assert_eq!(json["job_id"], "job_42_1700000000000");

        let decoded: QueueEvent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.job_id().as_str(), "job_42_1700000000000");
    }
}
