//! Worker supervisor: boot checks, the claim loop, graceful shutdown and
//! auto-recovery from broker connection loss.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vidpress_media::{check_ffmpeg, check_ffprobe};
use vidpress_models::{ErrorKind, Job, WebhookEvent};
use vidpress_queue::{Broker, ClaimedJob, FinalizeOutcome};
use vidpress_webhook::WebhookDispatcher;

use crate::config::WorkerConfig;
use crate::error::{PipelineFailure, WorkerError, WorkerResult};
use crate::pipeline::Pipeline;

/// Attempts for the initial broker connection before entering supervisory
/// restart mode.
const INITIAL_CONNECT_ATTEMPTS: u32 = 10;

type ClaimLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Boots the pipeline engine, subscribes to the broker and supervises the
/// claim loop across broker outages.
pub struct WorkerSupervisor {
    config: Arc<WorkerConfig>,
    broker: Arc<Broker>,
    dispatcher: Arc<WebhookDispatcher>,
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
    limiter: Arc<ClaimLimiter>,
    shutdown: watch::Sender<bool>,
    worker_id: String,
}

impl WorkerSupervisor {
    /// Boot: verify media roots and tool presence, then connect the broker.
    /// Failures here are fatal for the process (exit code 1).
    pub async fn boot(
        config: WorkerConfig,
        broker: Broker,
        dispatcher: WebhookDispatcher,
    ) -> WorkerResult<Self> {
        ensure_writable_root(&config.uploads_root).await?;
        ensure_writable_root(&config.content_root).await?;

        check_ffmpeg()?;
        check_ffprobe()?;

        // Initial connect: bounded linear retries, then give up.
        let mut attempt = 1;
        loop {
            match broker.init().await {
                Ok(()) => break,
                Err(e) if attempt < INITIAL_CONNECT_ATTEMPTS => {
                    warn!(attempt, "Broker not reachable yet: {}", e);
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(WorkerError::startup(format!(
                        "broker unreachable after {} attempts: {}",
                        INITIAL_CONNECT_ATTEMPTS, e
                    )))
                }
            }
        }

        let config = Arc::new(config);
        let broker = Arc::new(broker);
        let dispatcher = Arc::new(dispatcher);
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&config),
            Arc::clone(&broker),
            Arc::clone(&dispatcher),
        ));

        let cap = config.concurrency.max(1);
        let quota = Quota::per_second(
            NonZeroU32::new(cap as u32).unwrap_or(NonZeroU32::new(1).unwrap()),
        );
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(cap)),
            limiter: Arc::new(RateLimiter::direct(quota)),
            worker_id: format!("worker-{}", Uuid::new_v4()),
            config,
            broker,
            dispatcher,
            pipeline,
            shutdown,
        })
    }

    /// Signal shutdown: pause new claims and let in-flight jobs finish.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Supervise the claim loop, restarting it on connection loss with
    /// `min(5 s × 2^k, 60 s)` backoff. Returns after a clean shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker_id = %self.worker_id,
            concurrency = self.config.concurrency,
            "Starting worker supervisor"
        );

        let mut consecutive_failures: u32 = 0;
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.run_session(&mut consecutive_failures).await {
                Ok(()) => break,
                Err(e) => {
                    let delay = WorkerConfig::restart_delay(consecutive_failures);
                    consecutive_failures += 1;
                    error!(
                        failures = consecutive_failures,
                        "Worker session lost ({}), restart in {:?}", e, delay
                    );

                    // A single restart is scheduled at a time; shutdown
                    // cancels it.
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.drain().await;
        info!("Worker supervisor stopped");
        Ok(())
    }

    /// One broker session: claim, promote and reclaim until shutdown or a
    /// connection error.
    async fn run_session(&self, consecutive_failures: &mut u32) -> WorkerResult<()> {
        self.broker.init().await?;
        *consecutive_failures = 0;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut promote_tick = tokio::time::interval(self.config.promote_interval);
        let mut reclaim_tick = tokio::time::interval(self.config.reclaim_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, pausing claims");
                        return Ok(());
                    }
                }
                _ = promote_tick.tick() => {
                    self.broker.promote_due().await?;
                }
                _ = reclaim_tick.tick() => {
                    let reclaimed = self.broker.reclaim_stalled(&self.worker_id, 10).await?;
                    for claimed in reclaimed {
                        self.spawn_job(claimed).await?;
                    }
                }
                result = self.claim_cycle() => {
                    result?;
                }
            }
        }
    }

    /// Claim at most one job, honoring the concurrency cap and the
    /// cap-per-second claim rate.
    async fn claim_cycle(&self) -> WorkerResult<()> {
        if self.semaphore.available_permits() == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        self.limiter.until_ready().await;

        if let Some(claimed) = self.broker.claim_next(&self.worker_id, 1000).await? {
            self.spawn_job(claimed).await?;
        }
        Ok(())
    }

    async fn spawn_job(&self, claimed: ClaimedJob) -> WorkerResult<()> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::startup("semaphore closed"))?;

        let broker = Arc::clone(&self.broker);
        let dispatcher = Arc::clone(&self.dispatcher);
        let pipeline = Arc::clone(&self.pipeline);
        let heartbeat_interval = self.config.heartbeat_interval;
        let worker_id = self.worker_id.clone();

        tokio::spawn(async move {
            let _permit = permit;
            execute_job(
                broker,
                dispatcher,
                pipeline,
                claimed,
                worker_id,
                heartbeat_interval,
            )
            .await;
        });

        Ok(())
    }

    /// Wait up to the shutdown budget for in-flight jobs; anything left
    /// returns to pending through the broker's stall detection.
    async fn drain(&self) {
        let cap = self.config.concurrency.max(1);
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        info!("Waiting for in-flight jobs to complete...");
        while self.semaphore.available_permits() < cap {
            if tokio::time::Instant::now() >= deadline {
                warn!("Shutdown budget exhausted; remaining jobs will be reclaimed");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Run one claimed job to a terminal or delayed state.
async fn execute_job(
    broker: Arc<Broker>,
    dispatcher: Arc<WebhookDispatcher>,
    pipeline: Arc<Pipeline>,
    claimed: ClaimedJob,
    worker_id: String,
    heartbeat_interval: Duration,
) {
    let job = claimed.job;
    let entry_id = claimed.entry_id;
    info!(job_id = %job.id, attempt = job.attempt, "Executing job");

    // Keep ownership fresh while the pipeline runs.
    let heartbeat = {
        let broker = Arc::clone(&broker);
        let entry_id = entry_id.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(heartbeat_interval);
            tick.tick().await;
            loop {
                tick.tick().await;
                if let Err(e) = broker.heartbeat(&worker_id, &entry_id).await {
                    debug!(job_id = %job_id, "Heartbeat failed: {}", e);
                }
            }
        })
    };

    // Run the pipeline in its own task so a panic becomes a failed terminal
    // state instead of taking the worker down.
    let outcome = {
        let pipeline = Arc::clone(&pipeline);
        let job = job.clone();
        match tokio::spawn(async move { pipeline.run(&job).await }).await {
            Ok(result) => result,
            Err(join_error) => Err(PipelineFailure::new(
                ErrorKind::Internal,
                format!("pipeline fault: {}", join_error),
            )),
        }
    };

    heartbeat.abort();

    match outcome {
        Ok(result) => {
            match broker.finalize(&job.id, Ok(result.clone())).await {
                Ok(FinalizeOutcome::Recorded) => {
                    info!(job_id = %job.id, "Job completed");
                    let event = WebhookEvent::completion(&job, &result);
                    if let Err(e) = dispatcher.send(&event).await {
                        warn!(job_id = %job.id, "Completion webhook failed: {}", e);
                    }
                }
                Ok(FinalizeOutcome::Discarded) => {
                    // Cancelled mid-flight; the record is dropped silently.
                    info!(job_id = %job.id, "Result discarded (job no longer tracked)");
                }
                Err(e) => error!(job_id = %job.id, "Finalize failed: {}", e),
            }
        }
        Err(failure) => {
            fail_or_retry(&broker, &dispatcher, &job, failure).await;
        }
    }
}

/// Route an attempt failure into the retry policy or a failed terminal state.
async fn fail_or_retry(
    broker: &Broker,
    dispatcher: &WebhookDispatcher,
    job: &Job,
    failure: PipelineFailure,
) {
    let retryable = !failure.is_fatal() && job.attempts_remaining();

    if retryable {
        warn!(
            job_id = %job.id,
            attempt = job.attempt,
            "Attempt failed ({}), scheduling retry", failure
        );
        if let Err(e) = broker.delay_retry(&job.id).await {
            error!(job_id = %job.id, "Delay failed: {}", e);
        }
        return;
    }

    error!(job_id = %job.id, "Job failed: {}", failure);
    match broker.finalize(&job.id, Err(failure.to_string())).await {
        Ok(FinalizeOutcome::Recorded) => {
            let event = WebhookEvent::failure(job, failure.to_string());
            if let Err(e) = dispatcher.send(&event).await {
                warn!(job_id = %job.id, "Failure webhook failed: {}", e);
            }
        }
        Ok(FinalizeOutcome::Discarded) => {}
        Err(e) => error!(job_id = %job.id, "Finalize failed: {}", e),
    }
}

/// Create the root if missing and verify it accepts writes.
async fn ensure_writable_root(root: &Path) -> WorkerResult<()> {
    tokio::fs::create_dir_all(root).await.map_err(|e| {
        WorkerError::MediaRootUnwritable(format!("{}: {}", root.display(), e))
    })?;

    let probe = root.join(".write_check");
    tokio::fs::write(&probe, b"ok").await.map_err(|e| {
        WorkerError::MediaRootUnwritable(format!("{}: {}", root.display(), e))
    })?;
    let _ = tokio::fs::remove_file(&probe).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writable_root_check_creates_and_probes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("media").join("content");
        ensure_writable_root(&root).await.unwrap();
        assert!(root.is_dir());
        assert!(!root.join(".write_check").exists());
    }

    #[tokio::test]
    async fn unwritable_root_is_reported() {
        let err = ensure_writable_root(Path::new("/proc/no_such_root")).await;
        assert!(matches!(err, Err(WorkerError::MediaRootUnwritable(_))));
    }
}
