//! Fetch loop
//!
//! Every fetch period, asks the API for the items falling due in the next
//! window and appends them to the pending queue. The window then moves
//! forward by exactly one period, so consecutive cycles cover the timeline
//! without gaps or overlap. A failed fetch costs that cycle's items only;
//! the loop carries on with the next window.

use anyhow::{Context, Result};
use duewatch_client::DueItemApi;
use duewatch_core::domain::{DueItem, TimeWindow};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Clock;
use crate::service::PendingQueue;

/// Counters reported when the loop stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub cycles: u64,
    pub enqueued: u64,
    pub discarded: u64,
    pub failures: u64,
}

/// Producer side of the poller
pub struct FetchLoop {
    api: Arc<dyn DueItemApi>,
    queue: Arc<PendingQueue>,
    clock: Arc<dyn Clock>,
    period: Duration,
    window_length: chrono::Duration,
}

impl FetchLoop {
    pub fn new(
        api: Arc<dyn DueItemApi>,
        queue: Arc<PendingQueue>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!period.is_zero(), "Fetch interval must be greater than 0");
        let window_length =
            chrono::Duration::from_std(period).context("Fetch interval out of range")?;

        Ok(Self {
            api,
            queue,
            clock,
            period,
            window_length,
        })
    }

    /// Runs until `cancel` fires
    ///
    /// The first window starts at the current instant and is fetched right
    /// away; later windows are fetched one period apart.
    pub async fn run(self, cancel: CancellationToken) -> FetchStats {
        let mut stats = FetchStats::default();
        let mut window = TimeWindow::starting_at(self.clock.now(), self.window_length);
        let mut ticker = time::interval(self.period);

        info!(
            kind = %self.api.kind(),
            period = ?self.period,
            window_start = %window.start,
            "Starting fetch loop"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.api.fetch_due(&window) => result,
            };

            stats.cycles += 1;
            match result {
                Ok(items) => self.enqueue(&window, items, &mut stats),
                Err(e) => {
                    stats.failures += 1;
                    if e.is_transient() {
                        warn!(
                            window_start = %window.start,
                            window_end = %window.end,
                            "Failed to fetch due items, retrying next cycle: {}", e
                        );
                    } else {
                        error!(
                            window_start = %window.start,
                            window_end = %window.end,
                            "Failed to fetch due items: {}", e
                        );
                    }
                }
            }

            window = window.next();
        }

        debug!("Fetch loop cancelled");
        stats
    }

    fn enqueue(&self, window: &TimeWindow, items: Vec<DueItem>, stats: &mut FetchStats) {
        let fetched = items.len();
        let (inside, outside): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|item| window.contains(item.due_at));

        for item in &outside {
            warn!(
                item_id = %item.label(),
                due_at = %item.due_at,
                window_start = %window.start,
                window_end = %window.end,
                "Discarding item due outside the requested window"
            );
        }

        stats.enqueued += inside.len() as u64;
        stats.discarded += outside.len() as u64;

        if fetched > 0 {
            info!(
                window_start = %window.start,
                window_end = %window.end,
                fetched,
                enqueued = inside.len(),
                "Fetched due items"
            );
        } else {
            debug!(window_start = %window.start, window_end = %window.end, "No items due");
        }

        self.queue.push_tail_batch(inside);
    }
}
