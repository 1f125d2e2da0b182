//! Error types for the shutdown manager.
//!
//! The manager has a single failure mode: using the registration or lifecycle
//! surface after the manager has been started. A notifier that does not
//! acknowledge in time is not an error; it is recorded in the
//! [`ShutdownReport`](crate::report::ShutdownReport) instead.

use thiserror::Error;

/// Errors returned by [`Manager`](crate::manager::Manager) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The manager has already been started (or has already shut down).
    ///
    /// Returned by every registration call and by `start` once the lifecycle
    /// has left `NotStarted`. The call has no side effect.
    #[error("shutdown manager already started")]
    AlreadyStarted,
}

/// Result alias for manager operations.
pub type Result<T> = std::result::Result<T, ShutdownError>;
