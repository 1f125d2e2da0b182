//! Cooperative cancellation sources.
//!
//! A [`CancellationToken`] is the cancellation context a
//! [`CancellationWatcher`](crate::watcher::CancellationWatcher) observes.

mod token;

pub use token::{CancelCallback, CancellationToken};
