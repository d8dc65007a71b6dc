use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use super::AppState;
use crate::logs::BufferStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub buffer: BufferStats,
    pub subscribers: usize,
    /// Seconds since the last accepted external entry; absent until the first one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_lag_seconds: Option<f64>,
}

/// Health check endpoint
/// Reports ring occupancy and ingestion lag
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: "opslog",
            version: env!("CARGO_PKG_VERSION"),
            buffer: service.buffer_stats(),
            subscribers: service.subscriber_count(),
            ingest_lag_seconds: service.ingest_lag_seconds(),
        }),
    )
}

/// Readiness check endpoint
pub async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({
        "status": "ready",
        "service": "opslog",
    })))
}
