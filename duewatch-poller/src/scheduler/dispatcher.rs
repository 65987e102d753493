//! Dispatch loop
//!
//! Takes the head of the pending queue; if it is due, submits it, otherwise
//! puts it back at the head and sleeps until its due instant (an absolute
//! deadline, re-checked on wake-up). An empty queue is re-checked after a
//! short idle poll or as soon as something arrives.
//!
//! With [`QueueOrder::Fifo`] the head blocks the queue: nothing behind it is
//! looked at before its deadline, even if it is due sooner. With
//! [`QueueOrder::DueTime`] the head is always the earliest deadline, and a
//! new arrival interrupts the sleep in case it became the new head.

use duewatch_client::DueItemApi;
use duewatch_core::domain::DueItem;
use std::sync::Arc;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::Clock;
use crate::service::{DeadLetterSink, PendingQueue, QueueOrder};

/// Counters reported when the loop stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub submitted: u64,
    pub failed: u64,
    pub requeued: u64,
}

/// Consumer side of the poller
pub struct DispatchLoop {
    api: Arc<dyn DueItemApi>,
    queue: Arc<PendingQueue>,
    clock: Arc<dyn Clock>,
    dead_letters: Arc<dyn DeadLetterSink>,
    idle_poll: Duration,
}

impl DispatchLoop {
    pub fn new(
        api: Arc<dyn DueItemApi>,
        queue: Arc<PendingQueue>,
        clock: Arc<dyn Clock>,
        dead_letters: Arc<dyn DeadLetterSink>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            api,
            queue,
            clock,
            dead_letters,
            idle_poll,
        }
    }

    /// Runs until `cancel` fires
    ///
    /// Items still pending at that point stay in the queue.
    pub async fn run(self, cancel: CancellationToken) -> DispatchStats {
        let mut stats = DispatchStats::default();

        info!(
            kind = %self.api.kind(),
            order = %self.queue.order(),
            idle_poll = ?self.idle_poll,
            "Starting dispatch loop"
        );

        while !cancel.is_cancelled() {
            let Some(item) = self.queue.pop_head() else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = time::sleep(self.idle_poll) => {}
                    _ = self.queue.wait_for_arrival() => {}
                }
                continue;
            };

            let now = self.clock.now();
            if item.is_due(now) {
                self.dispatch(item, &mut stats).await;
                continue;
            }

            // Not due: the remaining wait is positive here.
            let wait = (item.due_at - now).to_std().unwrap_or(Duration::ZERO);
            let deadline = Instant::now() + wait;
            debug!(
                item_id = %item.label(),
                due_at = %item.due_at,
                "Item not due yet, sleeping for {:?}", wait
            );
            self.queue.push_head(item);
            stats.requeued += 1;

            match self.queue.order() {
                QueueOrder::Fifo => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = time::sleep_until(deadline) => {}
                    }
                }
                QueueOrder::DueTime => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = time::sleep_until(deadline) => {}
                        _ = self.queue.wait_for_arrival() => {}
                    }
                }
            }
        }

        debug!(pending = self.queue.len(), "Dispatch loop cancelled");
        stats
    }

    /// Submits a due item; a failure is final for this item
    async fn dispatch(&self, item: DueItem, stats: &mut DispatchStats) {
        match self.api.submit_processed(&item).await {
            Ok(()) => {
                stats.submitted += 1;
                info!(
                    item_id = %item.label(),
                    user = %item.user.email,
                    name = %item.user.display_name(),
                    book = item.book.title().unwrap_or_default(),
                    due_at = %item.due_at,
                    "Due notification dispatched"
                );
            }
            Err(e) => {
                stats.failed += 1;
                let reason = e.to_string();
                error!(
                    item_id = %item.label(),
                    due_at = %item.due_at,
                    "Failed to submit due item: {}", reason
                );

                if let Err(e) = self
                    .dead_letters
                    .record(self.api.kind(), &item, &reason)
                    .await
                {
                    error!(item_id = %item.label(), "Failed to record dead letter: {:#}", e);
                }
            }
        }
    }
}
