//! Cancellation-token watcher.

use super::{relay, Trigger, WatchSignal, Watcher};
use crate::cancellation::CancellationToken;
use std::sync::Arc;
use tracing::debug;

/// Fires when the wrapped [`CancellationToken`] is cancelled.
#[derive(Debug, Clone)]
pub struct CancellationWatcher {
    token: Arc<CancellationToken>,
}

impl CancellationWatcher {
    /// Creates a watcher for `token`.
    #[must_use]
    pub fn new(token: Arc<CancellationToken>) -> Self {
        Self { token }
    }

    /// Returns the watched token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }
}

impl Watcher for CancellationWatcher {
    fn watch(&self) -> WatchSignal {
        let token = self.token.clone();
        relay(async move {
            token.cancelled().await;
            let reason = token.reason().unwrap_or_default();
            debug!(%reason, "cancellation observed");
            Trigger::Cancelled { reason }
        })
    }
}
