//! Per-job progress throttling.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use vidpress_models::JobId;

/// Minimum percent delta that forces a send.
const MIN_PERCENT_DELTA: u8 = 5;

/// Minimum interval that forces a send regardless of delta.
const MIN_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_percent: u8,
    last_sent: Instant,
}

/// Suppresses redundant progress events per job.
///
/// An event passes when the percent advanced by at least 5, at least 3 s
/// elapsed since the previous send, the percent is exactly 100, or it is
/// the initial 0 → 0 start event. Terminal events bypass the throttle and
/// evict the entry, bounding the map's lifetime to in-flight jobs.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    entries: Mutex<HashMap<JobId, Entry>>,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a progress event at `percent` should be sent now,
    /// recording it when the answer is yes.
    pub fn should_send(&self, job_id: &JobId, percent: u8) -> bool {
        self.should_send_at(job_id, percent, Instant::now())
    }

    fn should_send_at(&self, job_id: &JobId, percent: u8, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let send = match entries.get(job_id) {
            None => true,
            Some(entry) => {
                percent >= entry.last_percent.saturating_add(MIN_PERCENT_DELTA)
                    || now.duration_since(entry.last_sent) >= MIN_INTERVAL
                    || percent == 100
                    || (percent == 0 && entry.last_percent == 0)
            }
        };

        if send {
            entries.insert(
                job_id.clone(),
                Entry {
                    last_percent: percent,
                    last_sent: now,
                },
            );
        }

        send
    }

    /// Evict a job's entry on its terminal event.
    pub fn clear(&self, job_id: &JobId) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(job_id);
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::from_string("job_42_1700000000000")
    }

    #[test]
    fn first_event_always_sends() {
        let throttle = ProgressThrottle::new();
        assert!(throttle.should_send_at(&job(), 0, Instant::now()));
    }

    #[test]
    fn small_deltas_are_suppressed() {
        let throttle = ProgressThrottle::new();
        let now = Instant::now();
        assert!(throttle.should_send_at(&job(), 10, now));
        assert!(!throttle.should_send_at(&job(), 12, now));
        assert!(!throttle.should_send_at(&job(), 14, now));
        assert!(throttle.should_send_at(&job(), 15, now));
    }

    #[test]
    fn elapsed_time_forces_a_send() {
        let throttle = ProgressThrottle::new();
        let start = Instant::now();
        assert!(throttle.should_send_at(&job(), 10, start));
        assert!(!throttle.should_send_at(&job(), 11, start));
        assert!(throttle.should_send_at(&job(), 11, start + Duration::from_secs(3)));
    }

    #[test]
    fn hundred_percent_always_sends() {
        let throttle = ProgressThrottle::new();
        let now = Instant::now();
        assert!(throttle.should_send_at(&job(), 99, now));
        assert!(throttle.should_send_at(&job(), 100, now));
    }

    #[test]
    fn repeated_zero_is_the_start_signal() {
        let throttle = ProgressThrottle::new();
        let now = Instant::now();
        assert!(throttle.should_send_at(&job(), 0, now));
        assert!(throttle.should_send_at(&job(), 0, now));
    }

    #[test]
    fn clear_evicts_the_entry() {
        let throttle = ProgressThrottle::new();
        assert!(throttle.should_send_at(&job(), 50, Instant::now()));
        assert_eq!(throttle.len(), 1);
        throttle.clear(&job());
        assert!(throttle.is_empty());
    }

    #[test]
    fn thirty_milestone_events_collapse_below_ten() {
        // The pipeline folds intra-stage percentages into milestone buckets,
        // so a 30-event burst looks like a plateaued ramp. Only the bucket
        // transitions pass the throttle.
        let throttle = ProgressThrottle::new();
        let now = Instant::now();
        let mut raw = vec![0u8];
        raw.extend(std::iter::repeat(25).take(10));
        raw.extend(std::iter::repeat(50).take(9));
        raw.extend(std::iter::repeat(75).take(9));
        raw.push(100);
        assert_eq!(raw.len(), 30);

        let sent: Vec<u8> = raw
            .into_iter()
            .filter(|p| throttle.should_send_at(&job(), *p, now))
            .collect();

        assert!(sent.len() <= 10, "sent {} events", sent.len());
        assert_eq!(sent.last().copied(), Some(100));
    }
}
