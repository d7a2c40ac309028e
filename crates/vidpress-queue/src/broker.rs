//! Broker client: durable queue primitives over a shared Redis instance.
//!
//! Pending jobs live on a stream consumed through a consumer group, so
//! at-most-one worker observes a given entry. Job records are JSON values
//! keyed by job id; a sorted set holds jobs in retry backoff; a second
//! sorted set indexes recent jobs for the admin surface.

use std::pin::Pin;

use futures_util::Stream;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vidpress_models::{Job, JobId, JobResult, JobState, QueueStats};

use crate::config::BrokerConfig;
use crate::error::{QueueError, QueueResult};
use crate::events::{QueueEvent, EVENTS_CHANNEL};

const JOB_KEY_PREFIX: &str = "vp:job:";
const ENTRY_KEY_PREFIX: &str = "vp:entry:";
const DEDUP_KEY_PREFIX: &str = "vp:dedup:";
const POST_KEY_PREFIX: &str = "vp:post:";
const RECENT_INDEX: &str = "vp:jobs:recent";
const STAT_COMPLETED: &str = "vp:stats:completed";
const STAT_FAILED: &str = "vp:stats:failed";

/// Upper bound on the recent-jobs index.
const RECENT_INDEX_CAP: isize = 500;

/// Outcome of a successful enqueue.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub job_id: JobId,
    pub queue_position: u64,
}

/// Outcome of finalize: whether this call wrote the terminal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Terminal record written by this call
    Recorded,
    /// Job was already terminal or no longer tracked; nothing written
    Discarded,
}

/// A job handed to a worker, with the stream entry backing it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub entry_id: String,
    pub job: Job,
}

/// Broker client handle. Cheap to clone the underlying connection factory;
/// construct once in the composition root and share via `Arc`.
pub struct Broker {
    client: redis::Client,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(BrokerConfig::from_env())
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Initialize the consumer group (idempotent).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Health probe.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    // ========================================================================
    // Enqueue / dedup
    // ========================================================================

    /// Enqueue a job built from a submission.
    ///
    /// Rejects when a job for the same post is already waiting, active or
    /// delayed. The whole operation runs under the configured end-to-end
    /// timeout; exceeding it reports the broker as unavailable.
    pub async fn enqueue(&self, job: Job) -> QueueResult<EnqueueOutcome> {
        match tokio::time::timeout(self.config.enqueue_timeout, self.enqueue_inner(job)).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::unavailable(format!(
                "enqueue exceeded {:?}",
                self.config.enqueue_timeout
            ))),
        }
    }

    async fn enqueue_inner(&self, job: Job) -> QueueResult<EnqueueOutcome> {
        let mut conn = self.conn().await?;

        let dedup_key = format!("{}{}", DEDUP_KEY_PREFIX, job.dedup_key());
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("Duplicate job rejected for post {}", job.request.post_id);
            return Err(QueueError::AlreadyQueued(job.request.post_id));
        }

        self.save_job(&mut conn, &job).await?;

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("id")
            .arg(job.id.as_str())
            .query_async(&mut conn)
            .await?;

        let () = conn
            .set(format!("{}{}", ENTRY_KEY_PREFIX, job.id), &entry_id)
            .await?;
        let () = conn.set(&dedup_key, job.id.as_str()).await?;
        let () = conn
            .set(
                format!("{}{}", POST_KEY_PREFIX, job.request.post_id),
                job.id.as_str(),
            )
            .await?;

        let () = conn
            .zadd(
                RECENT_INDEX,
                job.id.as_str(),
                job.created_at.timestamp_millis(),
            )
            .await?;
        let () = conn
            .zremrangebyrank(RECENT_INDEX, 0, -(RECENT_INDEX_CAP + 1))
            .await?;

        let queue_position: u64 = conn.xlen(&self.config.stream_name).await?;

        self.publish(&mut conn, &QueueEvent::Waiting {
            job_id: job.id.clone(),
        })
        .await;

        info!(job_id = %job.id, position = queue_position, "Enqueued job");

        Ok(EnqueueOutcome {
            job_id: job.id,
            queue_position,
        })
    }

    // ========================================================================
    // Claiming
    // ========================================================================

    /// Claim the next pending job, blocking up to `block_ms`.
    ///
    /// Returns `None` on an empty poll so callers can check for shutdown
    /// between blocks.
    pub async fn claim_next(&self, worker_id: &str, block_ms: u64) -> QueueResult<Option<ClaimedJob>> {
        let mut conn = self.conn().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(worker_id)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(claimed) = self.admit_entry(&mut conn, entry.id.clone(), &entry.map).await? {
                    return Ok(Some(claimed));
                }
            }
        }

        Ok(None)
    }

    /// Turn a stream entry into a claimed job, dropping entries whose job
    /// record is gone (cancelled while pending).
    async fn admit_entry(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        entry_id: String,
        fields: &std::collections::HashMap<String, redis::Value>,
    ) -> QueueResult<Option<ClaimedJob>> {
        let job_id = match fields.get("id") {
            Some(redis::Value::BulkString(raw)) => JobId::from_string(String::from_utf8_lossy(raw)),
            _ => {
                warn!("Malformed stream entry {}, acking", entry_id);
                self.ack_entry(conn, &entry_id).await?;
                return Ok(None);
            }
        };

        let Some(job) = self.load_job(conn, &job_id).await? else {
            debug!(job_id = %job_id, "Stream entry for removed job, acking");
            self.ack_entry(conn, &entry_id).await?;
            return Ok(None);
        };

        if job.state.is_terminal() {
            self.ack_entry(conn, &entry_id).await?;
            return Ok(None);
        }

        let job = job.start();
        if job.attempt > job.max_attempts {
            // Stall-reclaimed past its budget; close it out here.
            warn!(job_id = %job.id, "Attempts exhausted on reclaim, failing");
            self.ack_entry(conn, &entry_id).await?;
            let failed = job.fail("attempts exhausted");
            self.write_terminal(conn, &failed).await?;
            return Ok(None);
        }

        self.save_job(conn, &job).await?;
        let () = conn
            .set(format!("{}{}", ENTRY_KEY_PREFIX, job.id), &entry_id)
            .await?;

        self.publish(conn, &QueueEvent::Active {
            job_id: job.id.clone(),
        })
        .await;

        Ok(Some(ClaimedJob { entry_id, job }))
    }

    /// Refresh ownership of an in-flight entry so it is not reclaimed.
    pub async fn heartbeat(&self, worker_id: &str, entry_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        // XCLAIM with min-idle 0 resets the idle clock; JUSTID skips the payload.
        let _: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(worker_id)
            .arg(0)
            .arg(entry_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Reclaim entries whose consumer stopped heartbeating.
    ///
    /// Reclaimed jobs are handed back for execution, which is the pending →
    /// processing transition for a stalled job.
    pub async fn reclaim_stalled(&self, worker_id: &str, count: usize) -> QueueResult<Vec<ClaimedJob>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = self.config.stall_window.as_millis() as u64;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;
        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let details: Vec<Vec<redis::Value>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut stalled_ids = Vec::new();
        for detail in details {
            if let (Some(redis::Value::BulkString(id)), Some(redis::Value::Int(idle_ms))) =
                (detail.first(), detail.get(2))
            {
                if *idle_ms as u64 >= min_idle_ms {
                    if let Ok(id) = String::from_utf8(id.clone()) {
                        stalled_ids.push(id);
                    }
                }
            }
        }

        if stalled_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(worker_id)
            .arg(min_idle_ms);
        for id in &stalled_ids {
            cmd.arg(id);
        }

        let claimed: Vec<Vec<redis::Value>> = cmd.query_async(&mut conn).await?;

        let mut jobs = Vec::new();
        for message in claimed {
            let (Some(redis::Value::BulkString(id)), Some(redis::Value::Array(fields))) =
                (message.first(), message.get(1))
            else {
                continue;
            };
            let Ok(entry_id) = String::from_utf8(id.clone()) else {
                continue;
            };

            let mut map = std::collections::HashMap::new();
            let mut i = 0;
            while i + 1 < fields.len() {
                if let Some(redis::Value::BulkString(field)) = fields.get(i) {
                    map.insert(
                        String::from_utf8_lossy(field).to_string(),
                        fields[i + 1].clone(),
                    );
                }
                i += 2;
            }

            if let Some(claimed) = self.admit_entry(&mut conn, entry_id, &map).await? {
                info!(job_id = %claimed.job.id, "Reclaimed stalled job");
                self.publish(&mut conn, &QueueEvent::Stalled {
                    job_id: claimed.job.id.clone(),
                })
                .await;
                jobs.push(claimed);
            }
        }

        Ok(jobs)
    }

    // ========================================================================
    // Progress / terminal state
    // ========================================================================

    /// Best-effort progress update; no-op when the job is terminal or gone.
    pub async fn update_progress(&self, job_id: &JobId, percent: u8, stage: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let Some(job) = self.load_job(&mut conn, job_id).await? else {
            return Ok(());
        };
        if job.state.is_terminal() {
            return Ok(());
        }

        let mut job = job.with_progress(percent);
        job.stage = stage.to_string();
        self.save_job(&mut conn, &job).await?;
        Ok(())
    }

    /// Write the terminal record. Idempotent: the first terminal write wins,
    /// and a job removed by cancellation is silently discarded.
    pub async fn finalize(
        &self,
        job_id: &JobId,
        outcome: Result<JobResult, String>,
    ) -> QueueResult<FinalizeOutcome> {
        let mut conn = self.conn().await?;

        let Some(job) = self.load_job(&mut conn, job_id).await? else {
            debug!(job_id = %job_id, "Finalize for untracked job, discarding");
            return Ok(FinalizeOutcome::Discarded);
        };
        if job.state.is_terminal() {
            return Ok(FinalizeOutcome::Discarded);
        }

        let job = match outcome {
            Ok(result) => job.complete(result),
            Err(error) => job.fail(error),
        };
        self.write_terminal(&mut conn, &job).await?;
        Ok(FinalizeOutcome::Recorded)
    }

    async fn write_terminal(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
    ) -> QueueResult<()> {
        self.save_job(conn, job).await?;
        let () = conn
            .expire(
                format!("{}{}", JOB_KEY_PREFIX, job.id),
                self.config.terminal_ttl.as_secs() as i64,
            )
            .await?;

        if let Some(entry_id) = self.take_entry_id(conn, &job.id).await? {
            self.ack_entry(conn, &entry_id).await?;
        }
        let () = conn
            .del(format!("{}{}", DEDUP_KEY_PREFIX, job.dedup_key()))
            .await?;
        let () = conn.zrem(&self.config.delayed_set, job.id.as_str()).await?;

        let (counter, event) = match job.state {
            JobState::Completed => (
                STAT_COMPLETED,
                QueueEvent::Completed {
                    job_id: job.id.clone(),
                },
            ),
            _ => (
                STAT_FAILED,
                QueueEvent::Failed {
                    job_id: job.id.clone(),
                    error: job.error.clone().unwrap_or_default(),
                },
            ),
        };
        let () = conn.incr(counter, 1).await?;
        self.publish(conn, &event).await;

        info!(job_id = %job.id, state = %job.state, "Job finalized");
        Ok(())
    }

    // ========================================================================
    // Retry backoff
    // ========================================================================

    /// Park a job in the delayed set after a recoverable attempt failure.
    pub async fn delay_retry(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let Some(job) = self.load_job(&mut conn, job_id).await? else {
            return Ok(());
        };
        if job.state.is_terminal() {
            return Ok(());
        }

        if let Some(entry_id) = self.take_entry_id(&mut conn, &job.id).await? {
            self.ack_entry(&mut conn, &entry_id).await?;
        }

        let delay = self.config.retry_delay(job.attempt);
        let visible_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;
        let job = job.delay();
        self.save_job(&mut conn, &job).await?;
        let () = conn
            .zadd(&self.config.delayed_set, job.id.as_str(), visible_at)
            .await?;

        info!(job_id = %job.id, delay_secs = delay.as_secs(), "Job delayed for retry");
        Ok(())
    }

    /// Move due delayed jobs back onto the stream (delayed → pending).
    pub async fn promote_due(&self) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let now = chrono::Utc::now().timestamp();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.delayed_set)
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        let mut moved = 0;
        for raw_id in due {
            let job_id = JobId::from_string(&raw_id);
            let () = conn.zrem(&self.config.delayed_set, &raw_id).await?;

            let Some(mut job) = self.load_job(&mut conn, &job_id).await? else {
                continue;
            };
            if job.state != JobState::Delayed {
                continue;
            }
            job.state = JobState::Pending;
            self.save_job(&mut conn, &job).await?;

            let entry_id: String = redis::cmd("XADD")
                .arg(&self.config.stream_name)
                .arg("*")
                .arg("id")
                .arg(job.id.as_str())
                .query_async(&mut conn)
                .await?;
            let () = conn
                .set(format!("{}{}", ENTRY_KEY_PREFIX, job.id), &entry_id)
                .await?;

            self.publish(&mut conn, &QueueEvent::Waiting {
                job_id: job.id.clone(),
            })
            .await;
            moved += 1;
        }

        if moved > 0 {
            info!(count = moved, "Promoted delayed jobs");
        }
        Ok(moved)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Re-enqueue a failed job. Only valid from the failed state.
    pub async fn retry_failed(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn().await?;

        let Some(job) = self.load_job(&mut conn, job_id).await? else {
            return Ok(false);
        };
        if job.state != JobState::Failed {
            return Ok(false);
        }

        let mut job = job;
        job.state = JobState::Pending;
        job.attempt = 0;
        job.progress = 0;
        job.error = None;
        job.updated_at = chrono::Utc::now();
        self.save_job(&mut conn, &job).await?;
        let () = conn
            .persist(format!("{}{}", JOB_KEY_PREFIX, job.id))
            .await?;

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("id")
            .arg(job.id.as_str())
            .query_async(&mut conn)
            .await?;
        let () = conn
            .set(format!("{}{}", ENTRY_KEY_PREFIX, job.id), &entry_id)
            .await?;
        let () = conn
            .set(
                format!("{}{}", DEDUP_KEY_PREFIX, job.dedup_key()),
                job.id.as_str(),
            )
            .await?;

        self.publish(&mut conn, &QueueEvent::Waiting {
            job_id: job.id.clone(),
        })
        .await;

        info!(job_id = %job.id, "Retrying failed job");
        Ok(true)
    }

    /// Cancel a non-terminal job and drop it from the broker.
    pub async fn remove(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn().await?;

        let Some(job) = self.load_job(&mut conn, job_id).await? else {
            return Ok(false);
        };
        if job.state.is_terminal() {
            return Ok(false);
        }

        if let Some(entry_id) = self.take_entry_id(&mut conn, &job.id).await? {
            self.ack_entry(&mut conn, &entry_id).await?;
        }
        let () = conn.zrem(&self.config.delayed_set, job.id.as_str()).await?;
        let () = conn
            .del(format!("{}{}", DEDUP_KEY_PREFIX, job.dedup_key()))
            .await?;
        let () = conn.del(format!("{}{}", JOB_KEY_PREFIX, job.id)).await?;
        let () = conn.zrem(RECENT_INDEX, job.id.as_str()).await?;

        info!(job_id = %job.id, "Removed job");
        Ok(true)
    }

    /// Queue counters.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.conn().await?;

        let stream_len: u64 = conn.xlen(&self.config.stream_name).await?;
        let delayed: u64 = conn.zcard(&self.config.delayed_set).await?;
        let processing: u64 = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async::<redis::streams::StreamPendingReply>(&mut conn)
            .await
            .map(|r| r.count() as u64)
            .unwrap_or(0);
        let completed: u64 = conn.get(STAT_COMPLETED).await.unwrap_or(0);
        let failed: u64 = conn.get(STAT_FAILED).await.unwrap_or(0);

        Ok(QueueStats {
            pending: (stream_len + delayed).saturating_sub(processing),
            processing,
            completed,
            failed,
        })
    }

    /// Most recent jobs, newest first.
    pub async fn list_recent(&self, limit: usize) -> QueueResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let limit = limit.min(100);

        let ids: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(RECENT_INDEX)
            .arg(0)
            .arg(limit.saturating_sub(1) as isize)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw_id in ids {
            if let Some(job) = self.load_job(&mut conn, &JobId::from_string(raw_id)).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.conn().await?;
        self.load_job(&mut conn, job_id).await
    }

    /// Latest job for a post, if any is tracked.
    pub async fn find_by_post(&self, post_id: u64) -> QueueResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(format!("{}{}", POST_KEY_PREFIX, post_id)).await?;
        match raw {
            Some(id) => self.load_job(&mut conn, &JobId::from_string(id)).await,
            None => Ok(None),
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribe to lifecycle events.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe_events(
        &self,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = QueueEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(EVENTS_CHANNEL).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    async fn publish(&self, conn: &mut redis::aio::MultiplexedConnection, event: &QueueEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            // Event delivery is best-effort; the queue itself is the record.
            let _: Result<(), _> = conn.publish(EVENTS_CHANNEL, payload).await;
        }
    }

    // ========================================================================
    // Storage helpers
    // ========================================================================

    async fn save_job(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
    ) -> QueueResult<()> {
        let payload = serde_json::to_string(job)?;
        let () = conn.set(format!("{}{}", JOB_KEY_PREFIX, job.id), payload).await?;
        Ok(())
    }

    async fn load_job(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &JobId,
    ) -> QueueResult<Option<Job>> {
        let raw: Option<String> = conn.get(format!("{}{}", JOB_KEY_PREFIX, job_id)).await?;
        match raw {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn take_entry_id(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &JobId,
    ) -> QueueResult<Option<String>> {
        let key = format!("{}{}", ENTRY_KEY_PREFIX, job_id);
        let entry: Option<String> = conn.get(&key).await?;
        if entry.is_some() {
            let () = conn.del(&key).await?;
        }
        Ok(entry)
    }

    async fn ack_entry(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        entry_id: &str,
    ) -> QueueResult<()> {
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async::<()>(conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(entry_id)
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }
}
