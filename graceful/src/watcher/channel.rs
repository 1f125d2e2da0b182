//! Generic channel watcher.

use super::{relay, Trigger, WatchSignal, Watcher};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Fires when any value is received on a caller-supplied channel.
///
/// The channel closing (every sender dropped) also fires. The receiver is
/// shared between successive `watch` calls; a relay whose result is no longer
/// wanted stops reading, so no value is consumed on its behalf.
#[derive(Debug)]
pub struct ChannelWatcher<T> {
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> ChannelWatcher<T> {
    /// Creates a watcher that takes ownership of `receiver`.
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<T>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

impl<T> Clone for ChannelWatcher<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T: Send + 'static> Watcher for ChannelWatcher<T> {
    fn watch(&self) -> WatchSignal {
        let receiver = self.receiver.clone();
        relay(async move {
            let mut receiver = receiver.lock().await;
            match receiver.recv().await {
                Some(_) => debug!("channel event received"),
                None => debug!("watched channel closed"),
            }
            Trigger::Channel
        })
    }
}
