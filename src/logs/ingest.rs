//! External log submission (e.g. browser-side logs)

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::entry::{LogEntry, LogLevel, LogRecord};
use super::service::LogService;
use crate::error::AppError;

/// Source label used when a submission does not name one
pub const DEFAULT_INGEST_SOURCE: &str = "frontend";

/// Body of `POST /logs/ingest`
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub level: String,
    pub msg: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl IngestRequest {
    /// Validate the submission and turn it into a record (metadata not yet redacted)
    pub fn into_record(self) -> Result<LogRecord, AppError> {
        let level: LogLevel = self.level.parse()?;

        if self.msg.trim().is_empty() {
            return Err(AppError::Validation("msg must not be empty".to_string()));
        }

        let metadata = match self.metadata {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(AppError::Validation(
                    "metadata must be a JSON object".to_string(),
                ))
            }
        };

        let source = self
            .source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INGEST_SOURCE.to_string());

        Ok(LogRecord {
            level,
            message: self.msg,
            source: Some(source),
            metadata,
        })
    }
}

/// Compare a presented credential against the configured key.
/// With no key configured every request is accepted.
pub fn check_credential(expected: Option<&str>, provided: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = provided
        .ok_or_else(|| AppError::Unauthorized("Missing API key".to_string()))?;

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Invalid API key".to_string()))
    }
}

impl LogService {
    /// Check a credential against the current ingest key
    pub fn authorize(&self, credential: Option<&str>) -> Result<(), AppError> {
        let expected = self.ingest_key();
        check_credential(expected.as_deref().map(String::as_str), credential).inspect_err(|_| {
            crate::metrics::record_ingest("unauthorized");
        })
    }

    /// Authenticate, validate and store an external entry.
    ///
    /// Authentication runs first; nothing is stored unless both checks pass.
    pub fn ingest(
        &self,
        credential: Option<&str>,
        request: IngestRequest,
    ) -> Result<Arc<LogEntry>, AppError> {
        self.authorize(credential)?;

        let record = match request.into_record() {
            Ok(record) => record,
            Err(e) => {
                crate::metrics::record_ingest("invalid");
                return Err(e);
            }
        };

        let entry = self.append(record);
        self.mark_ingested(Utc::now());
        crate::metrics::record_ingest("accepted");
        Ok(entry)
    }
}
