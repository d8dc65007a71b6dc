//! The log service: one instance per process (or per test), shared by handle.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::entry::{LogEntry, LogLevel, LogRecord, Metadata};
use super::hub::{Subscription, SubscriptionHub};
use super::query::{self, LogQuery, Page, TimeRange};
use super::redact::redact_metadata;
use super::store::RingStore;
use crate::config::{IngestConfig, LogsConfig};

pub struct LogService {
    store: RingStore,
    hub: SubscriptionHub,
    /// Serializes append + fan-out so subscribers see entries in id order
    publish_lock: Mutex<()>,
    ingest_key: ArcSwapOption<String>,
    last_ingest: ArcSwapOption<DateTime<Utc>>,
    heartbeat: Duration,
    default_limit: usize,
}

/// A freshly opened stream: the subscription plus the history to replay first
#[derive(Debug)]
pub struct StreamStart {
    pub subscription: Subscription,
    /// Retained entries after the cursor, ascending
    pub backlog: Vec<Arc<LogEntry>>,
    /// Live entries with an id at or below this were covered by the snapshot
    pub skip_through: u64,
    /// Newest id the client holds once the backlog is sent
    pub delivered_through: Option<u64>,
}

/// Ring occupancy
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BufferStats {
    pub size: usize,
    pub capacity: usize,
}

impl LogService {
    pub fn new(logs: &LogsConfig, ingest: &IngestConfig) -> Self {
        let service = Self {
            store: RingStore::new(logs.buffer_size),
            hub: SubscriptionHub::new(logs.stream_queue_size),
            publish_lock: Mutex::new(()),
            ingest_key: ArcSwapOption::empty(),
            last_ingest: ArcSwapOption::empty(),
            heartbeat: Duration::from_secs(logs.heartbeat_seconds),
            default_limit: logs.default_limit,
        };
        service.set_ingest_key(ingest.key().map(str::to_string));
        service
    }

    /// Service with the given ring and queue sizes and an open ingest gateway
    pub fn with_capacity(buffer_size: usize, stream_queue_size: usize) -> Self {
        let logs = LogsConfig {
            buffer_size,
            stream_queue_size,
            ..LogsConfig::default()
        };
        Self::new(&logs, &IngestConfig::default())
    }

    /// Redact, store and fan out a record. Returns the stored entry.
    ///
    /// Must not emit tracing events: it runs inside the capture layer.
    pub fn append(&self, record: LogRecord) -> Arc<LogEntry> {
        let record = LogRecord {
            metadata: redact_metadata(record.metadata.as_ref()),
            ..record
        };

        let _guard = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());
        let entry = self.store.append(record);
        self.hub.publish(&entry);
        entry
    }

    /// Convenience wrapper over [`append`](Self::append)
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        source: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Arc<LogEntry> {
        self.append(LogRecord {
            level,
            message: message.into(),
            source: source.map(str::to_string),
            metadata,
        })
    }

    pub fn get_page(&self, query: &LogQuery) -> Page {
        query::get_page(&self.store.snapshot(), query)
    }

    pub fn export_range(
        &self,
        query: LogQuery,
        range: TimeRange,
    ) -> impl Iterator<Item = Arc<LogEntry>> {
        query::export_range(self.store.snapshot(), query, range)
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.hub.unsubscribe(subscription.id());
    }

    /// End every live stream and refuse new ones. Used on graceful shutdown so
    /// open SSE responses finish instead of holding the server open.
    pub fn shutdown(&self) {
        self.hub.close_all();
    }

    /// Open a live stream that resumes after `after`.
    ///
    /// Subscribes before taking the snapshot, so an entry appended in between
    /// shows up in both the backlog and the live queue. Callers skip live
    /// entries with an id at or below [`StreamStart::skip_through`].
    ///
    /// A cursor beyond the newest retained id was issued by an earlier process
    /// (ids restart at 1), so everything retained is replayed instead.
    pub fn open_stream(&self, after: Option<u64>) -> StreamStart {
        let subscription = self.subscribe();
        let snapshot = self.store.snapshot();
        let high_water = snapshot.last().map(|e| e.id).unwrap_or(0);

        let (backlog, cursor) = match after {
            None => (Vec::new(), None),
            Some(after) if after > high_water => (snapshot, None),
            Some(after) => {
                let query = LogQuery {
                    after: Some(after),
                    limit: 0,
                    ..LogQuery::default()
                };
                (query::get_page(&snapshot, &query).items, Some(after))
            }
        };

        // Without a cursor nothing is replayed, so every queued entry is new
        let skip_through = if after.is_some() { high_water } else { 0 };
        let delivered_through = backlog.last().map(|e| e.id).or(cursor);

        StreamStart {
            subscription,
            backlog,
            skip_through,
            delivered_through,
        }
    }

    pub fn buffer_stats(&self) -> BufferStats {
        BufferStats {
            size: self.store.len(),
            capacity: self.store.capacity(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.len()
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn set_ingest_key(&self, key: Option<String>) {
        self.ingest_key
            .store(key.filter(|k| !k.is_empty()).map(Arc::new));
    }

    pub(crate) fn ingest_key(&self) -> Option<Arc<String>> {
        self.ingest_key.load_full()
    }

    pub(crate) fn mark_ingested(&self, at: DateTime<Utc>) {
        self.last_ingest.store(Some(Arc::new(at)));
    }

    /// Time of the last successful external ingest
    pub fn last_ingest(&self) -> Option<DateTime<Utc>> {
        self.last_ingest.load_full().map(|ts| *ts)
    }

    /// Seconds since the last successful external ingest
    pub fn ingest_lag_seconds(&self) -> Option<f64> {
        self.last_ingest().map(|ts| {
            let lag = Utc::now().signed_duration_since(ts);
            lag.num_milliseconds().max(0) as f64 / 1000.0
        })
    }
}

impl Default for LogService {
    fn default() -> Self {
        Self::new(&LogsConfig::default(), &IngestConfig::default())
    }
}
