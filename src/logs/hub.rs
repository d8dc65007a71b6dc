//! Live fan-out of new entries to stream subscribers
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: when a queue is full its backlog is discarded and replaced by a
//! single [`StreamItem::Overflow`] marker, so a slow reader learns it missed
//! data and can catch up through a cursor query.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::Notify;

use super::entry::LogEntry;

/// Default per-subscriber queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Something delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Entry(Arc<LogEntry>),
    /// The queue filled up and its backlog was dropped
    Overflow,
}

pub type SubscriberId = u64;

struct SubscriberQueue {
    items: Mutex<VecDeque<StreamItem>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue without blocking. Returns true if the backlog had to be dropped.
    fn offer(&self, entry: &Arc<LogEntry>) -> bool {
        if self.is_closed() {
            return false;
        }
        let overflowed = {
            let mut items = self.lock();
            if items.len() < self.capacity {
                items.push_back(StreamItem::Entry(entry.clone()));
                false
            } else {
                items.clear();
                items.push_back(StreamItem::Overflow);
                true
            }
        };
        self.notify.notify_one();
        overflowed
    }

    fn pop(&self) -> Option<StreamItem> {
        self.lock().pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.lock().clear();
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StreamItem>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

type Registry = DashMap<SubscriberId, Arc<SubscriberQueue>>;

pub struct SubscriptionHub {
    subscribers: Arc<Registry>,
    next_id: AtomicU64,
    queue_capacity: usize,
    shutting_down: AtomicBool,
}

impl SubscriptionHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register a new subscriber. It receives only entries published after this call.
    ///
    /// After [`close_all`](Self::close_all) the returned subscription is already closed.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(self.queue_capacity));
        self.subscribers.insert(id, queue.clone());

        // Checked after the insert so a concurrent close_all cannot miss this queue
        if self.shutting_down.load(Ordering::Acquire) {
            remove(&self.subscribers, id);
            queue.close();
        } else {
            crate::metrics::set_subscribers(self.subscribers.len());
        }

        Subscription {
            id,
            queue,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Remove a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        remove(&self.subscribers, id);
    }

    /// Offer `entry` to every registered subscriber. Returns how many overflowed.
    pub fn publish(&self, entry: &Arc<LogEntry>) -> usize {
        // Copy the queue handles out so no registry shard lock is held while delivering
        let queues: Vec<Arc<SubscriberQueue>> =
            self.subscribers.iter().map(|r| r.value().clone()).collect();

        let overflows = queues.iter().filter(|q| q.offer(entry)).count();
        if overflows > 0 {
            crate::metrics::record_overflows(overflows);
        }
        overflows
    }

    /// Close every subscription and refuse new ones. Pending `recv` calls return `None`.
    pub fn close_all(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|r| *r.key()).collect();
        for id in ids {
            remove(&self.subscribers, id);
        }
        crate::metrics::set_subscribers(self.subscribers.len());
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}

fn remove(registry: &Registry, id: SubscriberId) {
    if let Some((_, queue)) = registry.remove(&id) {
        queue.close();
        crate::metrics::set_subscribers(registry.len());
    }
}

/// Receiving side of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<SubscriberQueue>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next item. Returns `None` once the subscription is closed.
    pub async fn recv(&self) -> Option<StreamItem> {
        loop {
            if self.queue.is_closed() {
                return None;
            }
            if let Some(item) = self.queue.pop() {
                return Some(item);
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between pop() and here is not lost
            self.queue.notify.notified().await;
        }
    }

    /// Take the next item if one is queued
    pub fn try_recv(&self) -> Option<StreamItem> {
        if self.queue.is_closed() {
            return None;
        }
        self.queue.pop()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match self.registry.upgrade() {
            Some(registry) => remove(&registry, self.id),
            None => self.queue.close(),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}
