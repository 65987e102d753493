//! Core domain types
//!
//! These types describe what the poller moves around: borrow and reserve
//! records awaiting a notification, the time windows they are fetched in,
//! and the bearer credentials used to talk to the library API.

pub mod credentials;
pub mod item;
pub mod window;

pub use credentials::Credentials;
pub use item::{BookRef, DueItem, DueKind, DueUser, ItemId};
pub use window::TimeWindow;
