use axum::Json;
use axum::extract::{Path, Query, State};

use crate::error::AppError;
use crate::models::job::Job;
use crate::routes::AppState;
use crate::store::query::JobQuery;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = state.store.list_jobs(&query.normalize()).await?;
    Ok(Json(jobs))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Job>, AppError> {
    let job = state
        .store
        .get_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok(Json(job))
}
