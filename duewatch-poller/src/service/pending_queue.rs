//! Pending queue
//!
//! Holds fetched items that are not yet due, between the fetch loop
//! (producer, appends at the tail) and the dispatch loop (consumer, takes the
//! head and puts it back at the head while it is not due yet).
//!
//! Every operation takes the lock once and releases it before returning, so
//! no caller can observe a half-inserted batch.

use duewatch_core::domain::DueItem;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// Order in which the dispatcher inspects pending items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    /// Arrival order; a not-yet-due head blocks everything behind it
    Fifo,
    /// Earliest `due_at` first, arrival order among equal deadlines
    DueTime,
}

impl FromStr for QueueOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(QueueOrder::Fifo),
            "due" | "due_time" | "priority" => Ok(QueueOrder::DueTime),
            other => Err(format!(
                "unknown queue order '{}', expected 'fifo' or 'due'",
                other
            )),
        }
    }
}

impl fmt::Display for QueueOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueOrder::Fifo => f.write_str("fifo"),
            QueueOrder::DueTime => f.write_str("due"),
        }
    }
}

/// Mutex-guarded double-ended queue of pending due items
pub struct PendingQueue {
    order: QueueOrder,
    items: Mutex<VecDeque<DueItem>>,
    arrivals: Notify,
}

impl PendingQueue {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            order,
            items: Mutex::new(VecDeque::new()),
            arrivals: Notify::new(),
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one item
    #[allow(dead_code)]
    pub fn push_tail(&self, item: DueItem) {
        self.push_tail_batch(std::iter::once(item));
    }

    /// Appends a whole fetch result under a single lock
    ///
    /// In `DueTime` order each item is inserted after every pending item due
    /// at or before it.
    pub fn push_tail_batch(&self, items: impl IntoIterator<Item = DueItem>) {
        let added = {
            let mut queue = self.lock();
            let before = queue.len();
            for item in items {
                match self.order {
                    QueueOrder::Fifo => queue.push_back(item),
                    QueueOrder::DueTime => {
                        let at = queue.partition_point(|p| p.due_at <= item.due_at);
                        queue.insert(at, item);
                    }
                }
            }
            queue.len() - before
        };

        if added > 0 {
            self.arrivals.notify_one();
        }
    }

    /// Removes and returns the head item
    pub fn pop_head(&self) -> Option<DueItem> {
        self.lock().pop_front()
    }

    /// Puts an inspected item back in front
    ///
    /// In `DueTime` order the item goes in front of every pending item due at
    /// or after it, which is the head unless something earlier arrived while
    /// the item was out of the queue.
    pub fn push_head(&self, item: DueItem) {
        let mut queue = self.lock();
        match self.order {
            QueueOrder::Fifo => queue.push_front(item),
            QueueOrder::DueTime => {
                let at = queue.partition_point(|p| p.due_at < item.due_at);
                queue.insert(at, item);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Completes once items have been appended since the last call returned
    ///
    /// An append made while nobody is waiting is remembered, so a consumer
    /// that checks the queue and then waits cannot miss it.
    pub async fn wait_for_arrival(&self) {
        self.arrivals.notified().await;
    }
}
