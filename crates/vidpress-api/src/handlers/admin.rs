//! Administrative operations.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vidpress_models::{Job, JobId};

use crate::error::{ApiError, ApiResult};
use crate::handlers::status::JobStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminAction {
    Acknowledge,
    Status,
    Retry,
    Cancel,
}

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub action: AdminAction,
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum AdminResponse {
    Ack {
        status: &'static str,
        message: String,
    },
    Job(Box<JobStatus>),
}

/// POST `/api/webhook`: `acknowledge`, `status`, `retry`, `cancel`.
/// Retry gates on the failed state; cancel on any non-terminal state.
pub async fn admin_webhook(
    State(state): State<AppState>,
    Json(request): Json<AdminRequest>,
) -> ApiResult<Json<AdminResponse>> {
    match request.action {
        AdminAction::Acknowledge => Ok(Json(AdminResponse::Ack {
            status: "ok",
            message: "acknowledged".to_string(),
        })),
        AdminAction::Status => {
            let job_id = require_job_id(&request)?;
            let job = state
                .broker
                .get_job(&job_id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("job {}", job_id)))?;
            Ok(Json(AdminResponse::Job(Box::new(job.into()))))
        }
        AdminAction::Retry => {
            let job_id = require_job_id(&request)?;
            if !state.broker.retry_failed(&job_id).await? {
                return Err(ApiError::Conflict(format!(
                    "job {} is not in the failed state",
                    job_id
                )));
            }
            info!(job_id = %job_id, "Job re-enqueued by admin");
            Ok(Json(AdminResponse::Ack {
                status: "ok",
                message: format!("job {} re-enqueued", job_id),
            }))
        }
        AdminAction::Cancel => {
            let job_id = require_job_id(&request)?;
            if !state.broker.remove(&job_id).await? {
                return Err(ApiError::Conflict(format!(
                    "job {} is terminal or unknown",
                    job_id
                )));
            }
            info!(job_id = %job_id, "Job cancelled by admin");
            Ok(Json(AdminResponse::Ack {
                status: "ok",
                message: format!("job {} cancelled", job_id),
            }))
        }
    }
}

fn require_job_id(request: &AdminRequest) -> ApiResult<JobId> {
    request
        .job_id
        .as_deref()
        .map(JobId::from_string)
        .ok_or_else(|| ApiError::bad_request("jobId is required for this action"))
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct JobsResponse {
    pub status: &'static str,
    pub jobs: Vec<JobStatus>,
}

/// GET `/api/admin/jobs?limit=` — recent jobs, capped at 100.
pub async fn admin_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<JobsResponse>> {
    let limit = query.limit.unwrap_or(50).min(100);
    let jobs: Vec<Job> = state.broker.list_recent(limit).await?;

    Ok(Json(JobsResponse {
        status: "ok",
        jobs: jobs.into_iter().map(JobStatus::from).collect(),
    }))
}
