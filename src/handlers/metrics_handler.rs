use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;
use crate::error::AppError;

/// Handle /metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let handle = state
        .metrics
        .ok_or_else(|| AppError::NotFound("metrics are not enabled".to_string()))?;
    Ok((StatusCode::OK, handle.render()))
}
