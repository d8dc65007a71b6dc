//! Bounded in-memory log history
//!
//! The ring and the id counter sit behind one `RwLock`. Writers hold it only
//! long enough to stamp the entry and push it; readers hold it only long
//! enough to clone the `Arc`s into a snapshot.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::entry::{LogEntry, LogRecord};

/// Default number of retained entries
pub const DEFAULT_CAPACITY: usize = 50_000;

struct Ring {
    entries: VecDeque<Arc<LogEntry>>,
    next_id: u64,
}

pub struct RingStore {
    inner: RwLock<Ring>,
    capacity: usize,
}

impl RingStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Ring {
                // Grow lazily; a full-size reservation would pin memory for idle stores
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_id: 1,
            }),
            capacity,
        }
    }

    /// Stamp `record` with the next id and the current time and push it,
    /// evicting the oldest entry when the ring is full.
    pub fn append(&self, record: LogRecord) -> Arc<LogEntry> {
        let (entry, evicted, len) = {
            let mut ring = self.write();
            let id = ring.next_id;
            ring.next_id += 1;

            let entry = Arc::new(record.into_entry(id, Utc::now()));
            ring.entries.push_back(entry.clone());

            let mut evicted = 0u64;
            while ring.entries.len() > self.capacity {
                ring.entries.pop_front();
                evicted += 1;
            }
            (entry, evicted, ring.entries.len())
        };

        crate::metrics::record_append(entry.level, evicted, len);
        entry
    }

    /// Point-in-time copy of the retained entries in ascending id order
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.read().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Id of the newest retained entry
    pub fn last_id(&self) -> Option<u64> {
        self.read().entries.back().map(|e| e.id)
    }

    // A panic while holding the lock cannot leave the ring half-updated
    // (every mutation is a single push/pop), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Ring> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ring> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RingStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
