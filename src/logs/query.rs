//! Filtering and pagination over a store snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::entry::{LogEntry, LogLevel};

/// Default page size for paginated queries
pub const DEFAULT_LIMIT: usize = 100;

/// Filter and page parameters for a history query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQuery {
    /// Exact match on the entry source
    pub source: Option<String>,

    /// Minimum severity (inclusive)
    pub level: Option<LogLevel>,

    /// Case-insensitive substring of the message
    pub q: Option<String>,

    /// Maximum number of items; `0` means unbounded
    pub limit: usize,

    /// Exclusive id cursor
    pub after: Option<u64>,
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Arc<LogEntry>>,
    /// Cursor for the next poll: id of the last item, or the request's `after` when empty
    pub next: Option<u64>,
}

/// Inclusive timestamp window for range exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.from && *ts <= self.to
    }
}

impl LogQuery {
    /// Whether `entry` passes the cursor and every filter, checked in
    /// cursor → source → level → text order.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(after) = self.after {
            if entry.id <= after {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if entry.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if entry.level < level {
                return false;
            }
        }
        if let Some(ref q) = self.q {
            if !entry.message.to_lowercase().contains(&q.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Filter `snapshot` (ascending by id) and keep the most recent `limit` matches.
pub fn get_page(snapshot: &[Arc<LogEntry>], query: &LogQuery) -> Page {
    let mut items: Vec<Arc<LogEntry>> = snapshot
        .iter()
        .filter(|e| query.matches(e))
        .cloned()
        .collect();

    if query.limit > 0 && items.len() > query.limit {
        items.drain(..items.len() - query.limit);
    }

    let next = items.last().map(|e| e.id).or(query.after);
    Page { items, next }
}

/// Lazily yield every entry in `snapshot` matching `query` and falling inside `range`.
/// `query.limit` is ignored.
pub fn export_range(
    snapshot: Vec<Arc<LogEntry>>,
    query: LogQuery,
    range: TimeRange,
) -> impl Iterator<Item = Arc<LogEntry>> {
    snapshot
        .into_iter()
        .filter(move |e| range.contains(&e.timestamp) && query.matches(e))
}
