//! # Graceful
//!
//! Orderly process termination for Tokio applications.
//!
//! Graceful provides:
//!
//! - **Watchers**: OS signals, cancellation tokens and arbitrary channels as
//!   shutdown triggers, fanned in so the first one wins
//! - **Notifiers**: cleanup participants that receive a shutdown notice and
//!   acknowledge when they are done
//! - **Bounded shutdown**: a single deadline for all participants, after which
//!   a configurable exit action runs exactly once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use graceful::prelude::*;
//!
//! let manager = Manager::new(Duration::from_secs(3));
//! manager.watch_signal([Signal::Interrupt, Signal::Terminate])?;
//!
//! let listener = manager.notifier("db-pool")?;
//! tokio::spawn(listener.cleanup_on_shutdown(|_trigger| async move {
//!     pool.close().await;
//! }));
//!
//! manager.start()?;
//! manager.wait().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod manager;
pub mod notifier;
pub mod report;
pub mod watcher;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ShutdownConfig;
    pub use crate::errors::{Result, ShutdownError};
    pub use crate::manager::{ExitAction, Lifecycle, Manager};
    pub use crate::notifier::{
        notifier, Notifier, NotifierOutcome, NotifierStatus, ShutdownListener, ShutdownNotice,
    };
    pub use crate::report::ShutdownReport;
    pub use crate::watcher::{
        CancellationWatcher, ChannelWatcher, Signal, SignalWatcher, Trigger, WatchSignal, Watcher,
    };
    pub use std::time::Duration;
}
