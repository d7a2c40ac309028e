//! Outbound webhook event model.
//!
//! Field names mirror the upstream plugin's expectations, so the payload
//! shapes here are the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId};
use crate::quality::Quality;
use crate::result::JobResult;

/// One webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(rename = "postId")]
    pub post_id: u64,
    pub status: String,
    pub progress: u8,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: WebhookPayload,
}

/// Event-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Completion(Box<CompletionPayload>),
    Failure { error: String },
    Progress {},
}

/// Completion payload: every produced URL plus aggregate stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(rename = "compressed480pUrl", skip_serializing_if = "Option::is_none")]
    pub compressed_480p_url: Option<String>,
    #[serde(rename = "compressed360pUrl", skip_serializing_if = "Option::is_none")]
    pub compressed_360p_url: Option<String>,
    #[serde(rename = "compressed240pUrl", skip_serializing_if = "Option::is_none")]
    pub compressed_240p_url: Option<String>,
    #[serde(rename = "compressed144pUrl", skip_serializing_if = "Option::is_none")]
    pub compressed_144p_url: Option<String>,
    #[serde(rename = "compressedThumbnailWebp", skip_serializing_if = "Option::is_none")]
    pub compressed_thumbnail_webp: Option<String>,
    #[serde(rename = "hlsMasterUrl", skip_serializing_if = "Option::is_none")]
    pub hls_master_url: Option<String>,
    #[serde(rename = "hls_480p", skip_serializing_if = "Option::is_none")]
    pub hls_480p: Option<String>,
    #[serde(rename = "hls_360p", skip_serializing_if = "Option::is_none")]
    pub hls_360p: Option<String>,
    #[serde(rename = "hls_240p", skip_serializing_if = "Option::is_none")]
    pub hls_240p: Option<String>,
    #[serde(rename = "hls_144p", skip_serializing_if = "Option::is_none")]
    pub hls_144p: Option<String>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub duration: f64,
    /// Wall-clock processing time in milliseconds
    pub processing_time: u64,
}

impl From<&JobResult> for CompletionPayload {
    fn from(result: &JobResult) -> Self {
        let get = |q: Quality| result.compressed.get(&q).cloned();
        let hls = |q: Quality| result.hls_variants.get(&q).cloned();
        Self {
            compressed_480p_url: get(Quality::Q480),
            compressed_360p_url: get(Quality::Q360),
            compressed_240p_url: get(Quality::Q240),
            compressed_144p_url: get(Quality::Q144),
            compressed_thumbnail_webp: result.thumbnail.clone(),
            hls_master_url: result.hls_master.clone(),
            hls_480p: hls(Quality::Q480),
            hls_360p: hls(Quality::Q360),
            hls_240p: hls(Quality::Q240),
            hls_144p: hls(Quality::Q144),
            original_size: result.stats.original_size,
            compressed_size: result.stats.compressed_size,
            compression_ratio: result.stats.compression_ratio,
            duration: result.stats.duration,
            processing_time: result.stats.processing_time_ms,
        }
    }
}

impl WebhookEvent {
    /// Progress event: carries only status and stage.
    pub fn progress(job: &Job, progress: u8, stage: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            post_id: job.request.post_id,
            status: "processing".to_string(),
            progress,
            stage: stage.into(),
            timestamp: Utc::now(),
            payload: WebhookPayload::Progress {},
        }
    }

    /// Completion event with the full result record.
    pub fn completion(job: &Job, result: &JobResult) -> Self {
        Self {
            job_id: job.id.clone(),
            post_id: job.request.post_id,
            status: "completed".to_string(),
            progress: 100,
            stage: "complete".to_string(),
            timestamp: Utc::now(),
            payload: WebhookPayload::Completion(Box::new(CompletionPayload::from(result))),
        }
    }

    /// Failure event with the terminal error string.
    pub fn failure(job: &Job, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            post_id: job.request.post_id,
            status: "failed".to_string(),
            progress: job.progress,
            stage: job.stage.clone(),
            timestamp: Utc::now(),
            payload: WebhookPayload::Failure {
                error: error.into(),
            },
        }
    }

    /// Terminal events always send and clear the throttler entry.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.payload, WebhookPayload::Progress {})
    }
}
