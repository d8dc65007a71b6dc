//! Log history, live stream and bulk export endpoints

use axum::{
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;

use super::AppState;
use crate::error::AppError;
use crate::logs::{LogEntry, LogLevel, LogQuery, Page, StreamItem, StreamStart, TimeRange};

/// Query parameters shared by `GET /logs` and `GET /logs/download`
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Exact source match
    pub source: Option<String>,

    /// Minimum level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    pub level: Option<String>,

    /// Case-insensitive message substring
    pub q: Option<String>,

    /// Page size; `0` returns every match
    pub limit: Option<usize>,

    /// Only entries with a greater id
    pub after: Option<u64>,
}

impl LogQueryParams {
    pub fn into_query(self, default_limit: usize) -> Result<LogQuery, AppError> {
        let level = non_empty(self.level)
            .map(|l| l.parse::<LogLevel>())
            .transpose()?;

        Ok(LogQuery {
            source: non_empty(self.source),
            level,
            q: non_empty(self.q),
            limit: self.limit.unwrap_or(default_limit),
            after: self.after,
        })
    }
}

/// Browsers send empty strings for unset form fields
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// GET /logs - paginated history
///
/// Example: GET /logs?source=api&level=ERROR&limit=50&after=1200
pub async fn get_logs(
    State(state): State<AppState>,
    params: Result<Query<LogQueryParams>, QueryRejection>,
) -> Result<Json<Page>, AppError> {
    let Query(params) = params?;
    let query = params.into_query(state.service.default_limit())?;
    Ok(Json(state.service.get_page(&query)))
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub after: Option<u64>,
}

/// GET /logs/stream - server-sent events
///
/// Replays retained entries after the cursor (`after`, else the
/// `Last-Event-ID` header), then forwards live entries. Each event id is the
/// entry id, so a reconnecting EventSource resumes where it stopped.
pub async fn stream_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<StreamParams>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Query(params) = params?;
    let after = params.after.or_else(|| last_event_id(&headers));

    let StreamStart {
        subscription,
        backlog,
        skip_through,
        delivered_through,
    } = state.service.open_stream(after);

    tracing::debug!(
        subscriber = subscription.id(),
        after = ?after,
        backlog = backlog.len(),
        skip_through,
        "log stream opened"
    );

    let replay = stream::iter(backlog).map(|entry| Ok::<_, Infallible>(entry_event(&entry)));

    // Dropping the stream (client disconnect) drops the subscription, which unregisters it.
    // The queue closing (server shutdown) ends the stream.
    let live = stream::unfold(
        (subscription, delivered_through),
        move |(subscription, mut last_sent)| async move {
            loop {
                let event = match subscription.recv().await? {
                    StreamItem::Entry(entry) if entry.id <= skip_through => continue,
                    StreamItem::Entry(entry) => {
                        last_sent = Some(entry.id);
                        entry_event(&entry)
                    }
                    StreamItem::Overflow => overflow_event(last_sent),
                };
                return Some((Ok::<_, Infallible>(event), (subscription, last_sent)));
            }
        },
    );

    let keep_alive = KeepAlive::new()
        .interval(state.service.heartbeat())
        .text("heartbeat");

    Ok(Sse::new(replay.chain(live)).keep_alive(keep_alive))
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn entry_event(entry: &LogEntry) -> Event {
    match serde_json::to_string(entry) {
        Ok(json) => Event::default().id(entry.id.to_string()).data(json),
        Err(_) => Event::default().comment("unserializable entry"),
    }
}

/// `last_id` is the newest entry this client received, so it can fetch the
/// dropped range from `GET /logs?after=<last_id>`
fn overflow_event(last_id: Option<u64>) -> Event {
    let payload = serde_json::json!({ "warning": "queue full", "last_id": last_id });
    Event::default().event("warning").data(payload.to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    pub source: Option<String>,
    pub level: Option<String>,
    pub q: Option<String>,
    /// Inclusive lower bound (RFC3339, or ISO-8601 without offset meaning UTC)
    pub from: Option<String>,
    /// Inclusive upper bound
    pub to: Option<String>,
}

/// GET /logs/download - newline-delimited JSON export of a time range
///
/// Example: GET /logs/download?from=2024-05-01T00:00:00Z&to=2024-05-02T00:00:00Z&level=ERROR
pub async fn download_logs(
    State(state): State<AppState>,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;

    let from = required_timestamp("from", params.from)?;
    let to = required_timestamp("to", params.to)?;
    if from > to {
        return Err(AppError::Validation("'from' must not be after 'to'".to_string()));
    }

    let query = LogQueryParams {
        source: params.source,
        level: params.level,
        q: params.q,
        limit: Some(0),
        after: None,
    }
    .into_query(0)?;

    let lines = state
        .service
        .export_range(query, TimeRange { from, to })
        .map(|entry| {
            serde_json::to_vec(&*entry).map(|mut line| {
                line.push(b'\n');
                Bytes::from(line)
            })
        });

    let headers = [
        (header::CONTENT_TYPE, "application/x-ndjson"),
        (header::CONTENT_DISPOSITION, "attachment; filename=\"logs.ndjson\""),
    ];

    Ok((headers, Body::from_stream(stream::iter(lines))).into_response())
}

fn required_timestamp(name: &str, value: Option<String>) -> Result<DateTime<Utc>, AppError> {
    let value = non_empty(value)
        .ok_or_else(|| AppError::Validation(format!("'{}' is required", name)))?;
    parse_timestamp(&value)
        .ok_or_else(|| AppError::Validation(format!("'{}' is not a valid timestamp: {}", name, value)))
}

/// Parse RFC3339, or a naive ISO-8601 date-time taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
