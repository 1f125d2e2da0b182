//! Trigger sources that start a shutdown.
//!
//! A [`Watcher`] arms its source when [`Watcher::watch`] is called and hands
//! back a one-shot receiver that resolves with a [`Trigger`] the first time the
//! source fires. The manager fans in every registered watcher and shuts down on
//! whichever fires first.
//!
//! Three variants ship with the crate:
//! - [`SignalWatcher`] for OS termination signals
//! - [`CancellationWatcher`] for a [`CancellationToken`](crate::cancellation::CancellationToken)
//! - [`ChannelWatcher`] for any value (or closure) on an mpsc channel

mod cancellation;
mod channel;
mod signal;

pub use cancellation::CancellationWatcher;
pub use channel::ChannelWatcher;
pub use signal::{Signal, SignalWatcher};

use serde::Serialize;
use std::future::Future;
use tokio::sync::oneshot;

/// One-shot receiver returned by [`Watcher::watch`].
///
/// A receiver that resolves with an error means the source was torn down and
/// will never fire.
pub type WatchSignal = oneshot::Receiver<Trigger>;

/// What caused a shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// An OS signal was delivered.
    Signal {
        /// The signal that fired.
        signal: Signal,
    },
    /// A cancellation token was cancelled.
    Cancelled {
        /// The reason given to the token.
        reason: String,
    },
    /// A value arrived on (or the sender side closed) a watched channel.
    Channel,
    /// `shutdown` was called directly.
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal { signal } => write!(f, "signal {signal}"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
            Self::Channel => f.write_str("channel event"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// A pluggable shutdown trigger source.
///
/// `watch` is called once per `start` from inside the Tokio runtime. It must
/// arm the source before returning and deliver at most one [`Trigger`].
#[cfg_attr(test, mockall::automock)]
pub trait Watcher: Send + Sync {
    /// Starts monitoring the source.
    fn watch(&self) -> WatchSignal;
}

/// Spawns `source` and forwards its trigger into a fresh one-shot channel.
///
/// The relay task exits early if the receiver is dropped, so a watcher that
/// lost the race does not keep consuming its source.
pub(crate) fn relay<F>(source: F) -> WatchSignal
where
    F: Future<Output = Trigger> + Send + 'static,
{
    let (mut tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let trigger = tokio::select! {
            trigger = source => Some(trigger),
            () = tx.closed() => None,
        };
        if let Some(trigger) = trigger {
            let _ = tx.send(trigger);
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::Manual.to_string(), "manual");
        assert_eq!(
            Trigger::Signal { signal: Signal::Terminate }.to_string(),
            "signal SIGTERM"
        );
        assert_eq!(
            Trigger::Cancelled { reason: "deploy".into() }.to_string(),
            "cancelled: deploy"
        );
    }

    #[test]
    fn test_trigger_serializes_with_kind_tag() {
        let value = serde_json::to_value(Trigger::Signal { signal: Signal::Interrupt }).unwrap();
        assert_eq!(value, serde_json::json!({ "kind": "signal", "signal": "SIGINT" }));
    }

    #[tokio::test]
    async fn test_relay_forwards_trigger() {
        let rx = relay(async { Trigger::Channel });
        assert_eq!(rx.await.unwrap(), Trigger::Channel);
    }

    #[tokio::test]
    async fn test_relay_stops_when_receiver_dropped() {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let rx = relay(async move {
            let _guard = done_tx;
            std::future::pending::<()>().await;
            Trigger::Manual
        });
        drop(rx);

        // The source future is dropped together with its guard.
        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("relay task should abandon its source")
            .unwrap_err();
    }
}
