//! Broker integration tests.
//!
//! These run against a live Redis (`REDIS_HOST`/`REDIS_PORT`), so they are
//! ignored by default: `cargo test -p vidpress-queue -- --ignored`.

use std::collections::BTreeMap;

use vidpress_models::{
    CompressionRequest, Job, JobResult, JobState, JobStats, Quality,
};
use vidpress_queue::{Broker, FinalizeOutcome, QueueError};

fn request(post_id: u64) -> CompressionRequest {
    CompressionRequest {
        post_id,
        media_path: format!("/wp-content/uploads/2025/01/clip_{}.mp4", post_id),
        video_url: Some("https://allowed.example.com/clip.mp4".to_string()),
        thumbnail_path: None,
        thumbnail_url: None,
        post_url: None,
        year: 2025,
        month: 1,
    }
}

fn result() -> JobResult {
    let mut compressed = BTreeMap::new();
    compressed.insert(Quality::Q480, "https://cdn/compressed_480p.mp4".to_string());
    JobResult {
        compressed,
        hls_variants: BTreeMap::new(),
        hls_master: None,
        thumbnail: None,
        stats: JobStats {
            original_size: 1000,
            compressed_size: 250,
            compression_ratio: 4.0,
            duration: 10.0,
            processing_time_ms: 500,
            qualities: Vec::new(),
        },
    }
}

/// Unique post id per test run so reruns do not collide on dedup keys.
fn unique_post_id() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_claim_finalize_round_trip() {
    dotenvy::dotenv().ok();

    let broker = Broker::from_env().expect("create broker");
    broker.init().await.expect("init");

    let post_id = unique_post_id();
    let outcome = broker
        .enqueue(Job::new(request(post_id)))
        .await
        .expect("enqueue");
    assert!(outcome.queue_position >= 1);

    let worker = format!("test-worker-{}", uuid::Uuid::new_v4());
    let mut attempts = 0;
    let claimed = loop {
        attempts += 1;
        assert!(attempts <= 20, "job never claimed");
        if let Some(claimed) = broker.claim_next(&worker, 1000).await.expect("claim") {
            if claimed.job.request.post_id == post_id {
                break claimed;
            }
            // A leftover from another run; drop it.
            broker
                .finalize(&claimed.job.id, Err("test cleanup".to_string()))
                .await
                .ok();
        }
    };

    assert_eq!(claimed.job.state, JobState::Processing);
    assert_eq!(claimed.job.attempt, 1);

    let payload = result();
    let recorded = broker
        .finalize(&claimed.job.id, Ok(payload.clone()))
        .await
        .expect("finalize");
    assert_eq!(recorded, FinalizeOutcome::Recorded);

    // Status reflects the finalize payload exactly.
    let stored = broker
        .get_job(&claimed.job.id)
        .await
        .expect("get")
        .expect("job exists");
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.progress, 100);
    let stored_result = stored.result.expect("result present");
    assert_eq!(
        stored_result.compressed.get(&Quality::Q480),
        payload.compressed.get(&Quality::Q480)
    );
    assert_eq!(stored_result.stats.original_size, payload.stats.original_size);

    // Terminal writes are idempotent.
    let again = broker
        .finalize(&claimed.job.id, Err("late failure".to_string()))
        .await
        .expect("second finalize");
    assert_eq!(again, FinalizeOutcome::Discarded);
    let unchanged = broker.get_job(&claimed.job.id).await.unwrap().unwrap();
    assert_eq!(unchanged.state, JobState::Completed);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_submission_is_rejected_until_terminal() {
    dotenvy::dotenv().ok();

    let broker = Broker::from_env().expect("create broker");
    broker.init().await.expect("init");

    let post_id = unique_post_id();
    let first = broker
        .enqueue(Job::new(request(post_id)))
        .await
        .expect("first enqueue");

    let duplicate = broker.enqueue(Job::new(request(post_id))).await;
    assert!(matches!(duplicate, Err(QueueError::AlreadyQueued(p)) if p == post_id));

    // Cancelling releases the identity.
    assert!(broker.remove(&first.job_id).await.expect("remove"));
    broker
        .enqueue(Job::new(request(post_id)))
        .await
        .expect("re-enqueue after remove");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn retry_gates_on_failed_state() {
    dotenvy::dotenv().ok();

    let broker = Broker::from_env().expect("create broker");
    broker.init().await.expect("init");

    let post_id = unique_post_id();
    let outcome = broker
        .enqueue(Job::new(request(post_id)))
        .await
        .expect("enqueue");

    // Pending jobs cannot be retried.
    assert!(!broker.retry_failed(&outcome.job_id).await.expect("retry pending"));

    broker
        .finalize(&outcome.job_id, Err("boom".to_string()))
        .await
        .expect("fail job");
    let failed = broker.get_job(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.error.as_deref(), Some("boom"));

    assert!(broker.retry_failed(&outcome.job_id).await.expect("retry failed"));
    let retried = broker.get_job(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(retried.state, JobState::Pending);
    assert_eq!(retried.attempt, 0);

    broker.remove(&outcome.job_id).await.ok();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn recent_jobs_and_stats_are_tracked() {
    dotenvy::dotenv().ok();

    let broker = Broker::from_env().expect("create broker");
    broker.init().await.expect("init");

    let post_id = unique_post_id();
    let outcome = broker
        .enqueue(Job::new(request(post_id)))
        .await
        .expect("enqueue");

    let recent = broker.list_recent(100).await.expect("list recent");
    assert!(recent.iter().any(|j| j.id == outcome.job_id));

    let found = broker
        .find_by_post(post_id)
        .await
        .expect("find by post")
        .expect("job for post");
    assert_eq!(found.id, outcome.job_id);

    let stats = broker.stats().await.expect("stats");
    assert!(stats.pending >= 1);

    broker.remove(&outcome.job_id).await.ok();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn lifecycle_events_are_published() {
    use futures_util::StreamExt;

    dotenvy::dotenv().ok();

    let broker = Broker::from_env().expect("create broker");
    broker.init().await.expect("init");

    let mut events = broker.subscribe_events().await.expect("subscribe");

    // Give the subscriber time to connect before producing.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let post_id = unique_post_id();
    let outcome = broker
        .enqueue(Job::new(request(post_id)))
        .await
        .expect("enqueue");

    let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.next())
        .await
        .expect("event within deadline")
        .expect("stream open");
    assert_eq!(event.job_id(), &outcome.job_id);

    broker.remove(&outcome.job_id).await.ok();
}
