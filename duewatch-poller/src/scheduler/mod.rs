//! Scheduler layer for the poller
//!
//! Two long-running loops sharing a [`PendingQueue`](crate::service::PendingQueue):
//! the fetch loop pulls consecutive time windows of due items from the API,
//! the dispatch loop submits each item once its due instant is reached.
//! Both stop when the shared cancellation token fires.

pub mod clock;
pub mod dispatcher;
pub mod fetcher;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, SystemClock};
pub use dispatcher::{DispatchLoop, DispatchStats};
pub use fetcher::{FetchLoop, FetchStats};
