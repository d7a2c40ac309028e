//! Job identity and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::request::CompressionRequest;
use crate::result::JobResult;

/// Unique identifier for a compression job.
///
/// The identity is deterministic from the submission: `job_<postId>_<unixMillis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Build an identity for a post at a given creation instant.
    pub fn for_post(post_id: u64, created_at: DateTime<Utc>) -> Self {
        Self(format!("job_{}_{}", post_id, created_at.timestamp_millis()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the post id component, if the identity is well-formed.
    pub fn post_id(&self) -> Option<u64> {
        let rest = self.0.strip_prefix("job_")?;
        let (post, millis) = rest.split_once('_')?;
        millis.parse::<i64>().ok()?;
        post.parse().ok()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Enqueued, not yet picked by a worker
    #[default]
    Pending,
    /// A worker has claimed the job
    Processing,
    /// Terminal: success
    Completed,
    /// Terminal: all retries exhausted
    Failed,
    /// Backoff between retries
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    /// Terminal records are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compression job as stored by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Deterministic identity (`job_<postId>_<unixMillis>`)
    pub id: JobId,

    /// The original submission payload
    pub request: CompressionRequest,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Number of attempts started so far
    #[serde(default)]
    pub attempt: u32,

    /// Maximum attempts allowed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Progress percent (0..=100)
    #[serde(default)]
    pub progress: u8,

    /// Last stage tag ("downloading", "compressing_480p", ...)
    #[serde(default)]
    pub stage: String,

    /// Terminal result record (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    /// Terminal error string (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}

impl Job {
    /// Create a new pending job from a submission.
    pub fn new(request: CompressionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::for_post(request.post_id, now),
            request,
            created_at: now,
            updated_at: now,
            attempt: 0,
            max_attempts: default_max_attempts(),
            state: JobState::Pending,
            progress: 0,
            stage: "queued".to_string(),
            result: None,
            error: None,
        }
    }

    /// Deduplication key: one non-terminal job per post.
    pub fn dedup_key(&self) -> String {
        format!("post:{}", self.request.post_id)
    }

    /// Start a new attempt.
    pub fn start(mut self) -> Self {
        self.state = JobState::Processing;
        self.attempt += 1;
        self.progress = 0;
        self.updated_at = Utc::now();
        self
    }

    /// Mark as completed with a result record.
    pub fn complete(mut self, result: JobResult) -> Self {
        self.state = JobState::Completed;
        self.progress = 100;
        self.stage = "complete".to_string();
        self.result = Some(result);
        self.updated_at = Utc::now();
        self
    }

    /// Mark as failed with an error string.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        self
    }

    /// Move into backoff between retries.
    pub fn delay(mut self) -> Self {
        self.state = JobState::Delayed;
        self.updated_at = Utc::now();
        self
    }

    /// Whether another attempt may be started after a recoverable failure.
    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Update progress, clamped to 100 and monotonic within an attempt.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100).max(self.progress);
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> CompressionRequest {
        CompressionRequest {
            post_id: 42,
            media_path: "/wp-content/uploads/2025/01/clip.mp4".to_string(),
            video_url: None,
            thumbnail_path: None,
            thumbnail_url: None,
            post_url: None,
            year: 2025,
            month: 1,
        }
    }

    #[test]
    fn identity_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let id = JobId::for_post(42, at);
        assert_eq!(id.as_str(), format!("job_42_{}", at.timestamp_millis()));
        assert_eq!(id.post_id(), Some(42));
    }

    #[test]
    fn malformed_identity_has_no_post() {
        assert_eq!(JobId::from_string("job_").post_id(), None);
        assert_eq!(JobId::from_string("42_1700000000000").post_id(), None);
        assert_eq!(JobId::from_string("job_42_notmillis").post_id(), None);
    }

    #[test]
    fn state_transitions() {
        let job = Job::new(request());
        assert_eq!(job.state, JobState::Pending);

        let started = job.start();
        assert_eq!(started.state, JobState::Processing);
        assert_eq!(started.attempt, 1);

        let failed = started.fail("boom");
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.state.is_terminal());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn progress_is_monotonic() {
        let job = Job::new(request()).start().with_progress(40);
        let job = job.with_progress(25);
        assert_eq!(job.progress, 40);
        let job = job.with_progress(150);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn dedup_key_is_post_scoped() {
        assert_eq!(Job::new(request()).dedup_key(), "post:42");
    }
}
