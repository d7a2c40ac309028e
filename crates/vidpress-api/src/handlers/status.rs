//! Job status queries.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vidpress_models::{Job, JobId, JobResult, JobState, QueueStats};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
    #[serde(rename = "postId")]
    pub post_id: Option<u64>,
}

/// Status of one job, or queue counters when no parameter is given.
#[derive(Serialize)]
#[serde(untagged)]
pub enum StatusResponse {
    Job(Box<JobStatus>),
    Queue { status: &'static str, stats: QueueStats },
}

#[derive(Serialize)]
pub struct JobStatus {
    pub status: &'static str,
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(rename = "postId")]
    pub post_id: u64,
    pub state: JobState,
    pub progress: u8,
    pub stage: String,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatus {
    fn from(job: Job) -> Self {
        Self {
            status: "ok",
            post_id: job.request.post_id,
            job_id: job.id,
            state: job.state,
            progress: job.progress,
            stage: job.stage,
            attempt: job.attempt,
            result: job.result,
            error: job.error,
        }
    }
}

/// GET `/api/status?jobId=…` (or `?postId=…`).
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    if let Some(raw_id) = query.job_id {
        let job = state
            .broker
            .get_job(&JobId::from_string(&raw_id))
            .await?
            .ok_or_else(|| ApiError::not_found(format!("job {}", raw_id)))?;
        return Ok(Json(StatusResponse::Job(Box::new(job.into()))));
    }

    if let Some(post_id) = query.post_id {
        let job = state
            .broker
            .find_by_post(post_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("no job for post {}", post_id)))?;
        return Ok(Json(StatusResponse::Job(Box::new(job.into()))));
    }

    let stats = state.broker.stats().await?;
    Ok(Json(StatusResponse::Queue {
        status: "ok",
        stats,
    }))
}
