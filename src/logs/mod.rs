//! In-process operational log service
//!
//! ```text
//! producer (tracing event / POST /logs/ingest)
//!     → redact metadata
//!     → RingStore::append (id + timestamp, oldest evicted)
//!     → SubscriptionHub::publish (bounded per-subscriber queues)
//!
//! query / download → snapshot of the RingStore
//! ```

pub mod entry;
pub mod hub;
pub mod ingest;
pub mod layer;
pub mod query;
pub mod redact;
pub mod service;
pub mod store;

pub use entry::{LogEntry, LogLevel, LogRecord, Metadata};
pub use hub::{StreamItem, Subscription, SubscriptionHub};
pub use ingest::IngestRequest;
pub use layer::CaptureLayer;
pub use query::{LogQuery, Page, TimeRange};
pub use service::{BufferStats, LogService, StreamStart};
pub use store::RingStore;
