//! Service layer for the poller
//!
//! State and side effects shared by the loops:
//! - Pending queue: items fetched but not yet dispatched
//! - Dead letters: where failed submissions end up

pub mod dead_letter;
pub mod pending_queue;

pub use dead_letter::{DeadLetterSink, DiscardDeadLetters, JsonlDeadLetterFile};
pub use pending_queue::{PendingQueue, QueueOrder};
