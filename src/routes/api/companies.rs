use axum::Json;
use axum::extract::{Path, State};

use crate::error::AppError;
use crate::models::company::Company;
use crate::routes::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Company>>, AppError> {
    let companies = state.store.list_companies().await?;
    Ok(Json(companies))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Company>, AppError> {
    let company = state
        .store
        .get_company(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Company {id} not found")))?;
    Ok(Json(company))
}
