//! Health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use vidpress_media::check_ffmpeg;
use vidpress_models::QueueStats;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub broker: CheckStatus,
    pub transcoder: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok",
            error: None,
            latency_ms,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error",
            error: Some(msg.into()),
            latency_ms: None,
        }
    }
}

/// GET `/api/health` — unauthenticated; 200 when both dependencies are up.
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let broker = {
        let start = std::time::Instant::now();
        match state.broker.ping().await {
            Ok(()) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64)),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let transcoder = match check_ffmpeg() {
        Ok(_) => CheckStatus::ok(None),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let queue = state.broker.stats().await.ok();

    let all_ok = broker.status == "ok" && transcoder.status == "ok";
    let response = HealthResponse {
        status: if all_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        broker,
        transcoder,
        queue,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
