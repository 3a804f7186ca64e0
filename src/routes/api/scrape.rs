use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, TriggerError};
use crate::models::run::{RunPhase, RunStatus};
use crate::routes::AppState;

/// Used when the request body omits `max_jobs`.
const DEFAULT_MAX_JOBS: i64 = 3;

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    pub max_jobs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_added: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_updated: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_unchanged: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapters_completed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapters_total: Option<usize>,
}

impl From<RunStatus> for StatusResponse {
    fn from(status: RunStatus) -> Self {
        let report = status.report;
        Self {
            status: status.state,
            last_run: report.as_ref().and_then(|r| r.finished_at),
            jobs_added: report.as_ref().map(|r| r.jobs_added),
            jobs_updated: report.as_ref().map(|r| r.jobs_updated),
            jobs_unchanged: report.as_ref().map(|r| r.jobs_unchanged),
            errors: report.map(|r| r.errors),
            adapters_completed: status.progress.map(|p| p.adapters_completed),
            adapters_total: status.progress.map(|p| p.adapters_total),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub status: RunPhase,
    pub jobs_added: u32,
    pub jobs_updated: u32,
    pub jobs_unchanged: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// GET /api/scrape/
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.coordinator.status().into())
}

/// POST /api/scrape/
///
/// Starts a run and answers once it is finalized. A run already in
/// progress gets 409 and is left untouched.
pub async fn trigger(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: TriggerRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TriggerRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let limit = state.coordinator.max_jobs_limit();
    let max_jobs = request.max_jobs.unwrap_or(DEFAULT_MAX_JOBS);
    let max_jobs = u32::try_from(max_jobs).map_err(|_| TriggerError::InvalidLimit(limit))?;

    let handle = match state.coordinator.trigger(max_jobs) {
        Ok(handle) => handle,
        Err(TriggerError::ConcurrentRunRejected) => {
            return Ok((
                StatusCode::CONFLICT,
                Json(json!({
                    "success": false,
                    "error": TriggerError::ConcurrentRunRejected.to_string(),
                })),
            )
                .into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let report = handle
        .finished()
        .await
        .map_err(|e| AppError::Internal(format!("Run task failed: {e}")))?;

    Ok(Json(TriggerResponse {
        success: report.success(),
        status: report.status,
        jobs_added: report.jobs_added,
        jobs_updated: report.jobs_updated,
        jobs_unchanged: report.jobs_unchanged,
        errors: report.errors,
    })
    .into_response())
}
