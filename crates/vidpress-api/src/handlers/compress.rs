//! Job submission.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use vidpress_models::{CompressionRequest, Job};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CompressResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "queuePosition")]
    pub queue_position: u64,
    #[serde(rename = "queueLength")]
    pub queue_length: u64,
}

/// POST `/api/compress`: validate, check the broker, enqueue.
pub async fn compress(
    State(state): State<AppState>,
    Json(request): Json<CompressionRequest>,
) -> ApiResult<Json<CompressResponse>> {
    request
        .validate()
        .map_err(|(_, message)| ApiError::Validation(message))?;

    state
        .broker
        .ping()
        .await
        .map_err(|e| ApiError::BrokerUnavailable(e.to_string()))?;

    let post_id = request.post_id;
    let outcome = state.broker.enqueue(Job::new(request)).await?;
    let stats = state.broker.stats().await.unwrap_or_default();

    info!(job_id = %outcome.job_id, post_id, "Job accepted");

    Ok(Json(CompressResponse {
        status: "queued",
        message: format!("compression queued for post {}", post_id),
        job_id: outcome.job_id.to_string(),
        queue_position: outcome.queue_position,
        queue_length: stats.pending,
    }))
}
