//! `POST /logs/ingest` - external log submission

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use super::AppState;
use crate::{auth::extract_credential, error::AppError, logs::IngestRequest};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: u64,
}

/// Accept one entry from an external producer.
///
/// The credential is checked before the body is looked at, so an
/// unauthenticated caller gets 401 even for a malformed payload.
pub async fn ingest_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let credential = extract_credential(&headers);
    let service = &state.service;

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            service.authorize(credential)?;
            crate::metrics::record_ingest("invalid");
            return Err(rejection.into());
        }
    };

    let entry = service.ingest(credential, request)?;
    Ok(Json(IngestResponse { id: entry.id }))
}
