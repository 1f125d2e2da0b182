//! Configuration for the shutdown manager.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration applied when a [`Manager`](crate::manager::Manager) is built.
///
/// The configuration is frozen once the manager exists; only the exit action
/// can be replaced afterwards, and only before `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long shutdown waits for notifiers before running the exit action.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Process status used by the default exit action.
    #[serde(default = "default_exit_code")]
    pub exit_code: i32,
}

fn default_timeout() -> f64 {
    3.0
}

fn default_exit_code() -> i32 {
    1
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            exit_code: default_exit_code(),
        }
    }
}

impl ShutdownConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the notify timeout in seconds.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the notify timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the status passed to `std::process::exit` by the default exit action.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Returns the notify timeout as a [`Duration`].
    ///
    /// Negative, NaN and infinite values clamp to zero.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        if self.timeout_seconds.is_finite() && self.timeout_seconds > 0.0 {
            Duration::from_secs_f64(self.timeout_seconds)
        } else {
            Duration::ZERO
        }
    }
}
