//! OS signal watcher.

use super::{relay, Trigger, WatchSignal, Watcher};
use futures::future::{select_all, BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Asynchronous termination signals a [`SignalWatcher`] can observe.
///
/// Only [`Signal::Interrupt`] (Ctrl-C) is observable on non-Unix targets; the
/// other variants never fire there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Signal {
    /// `SIGINT`.
    #[serde(rename = "SIGINT")]
    Interrupt,
    /// `SIGTERM`.
    #[serde(rename = "SIGTERM")]
    Terminate,
    /// `SIGHUP`.
    #[serde(rename = "SIGHUP")]
    Hangup,
    /// `SIGQUIT`.
    #[serde(rename = "SIGQUIT")]
    Quit,
    /// `SIGUSR1`.
    #[serde(rename = "SIGUSR1")]
    User1,
    /// `SIGUSR2`.
    #[serde(rename = "SIGUSR2")]
    User2,
}

impl Signal {
    /// Returns the conventional signal name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
            Self::User1 => "SIGUSR1",
            Self::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            Self::Interrupt => SignalKind::interrupt(),
            Self::Terminate => SignalKind::terminate(),
            Self::Hangup => SignalKind::hangup(),
            Self::Quit => SignalKind::quit(),
            Self::User1 => SignalKind::user_defined1(),
            Self::User2 => SignalKind::user_defined2(),
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fires on the first delivery of any configured signal.
///
/// Every call to `watch` installs fresh signal streams, so re-watching after a
/// previous watch cleanly re-establishes delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalWatcher {
    signals: Vec<Signal>,
}

impl SignalWatcher {
    /// Creates a watcher for the given signals.
    #[must_use]
    pub fn new(signals: impl IntoIterator<Item = Signal>) -> Self {
        let mut unique = Vec::new();
        for signal in signals {
            if !unique.contains(&signal) {
                unique.push(signal);
            }
        }
        Self { signals: unique }
    }

    /// Watches `SIGINT` and `SIGTERM`.
    #[must_use]
    pub fn terminate() -> Self {
        Self::new([Signal::Interrupt, Signal::Terminate])
    }

    /// Returns the configured signals.
    #[must_use]
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }
}

impl Watcher for SignalWatcher {
    fn watch(&self) -> WatchSignal {
        let listeners = listen(&self.signals);
        if listeners.is_empty() {
            // Nothing could be installed. The sender is dropped here, so the receiver
            // resolves with an error and the aggregation loop drops it from the race.
            let (_tx, rx) = oneshot::channel();
            return rx;
        }

        relay(async move {
            let (signal, _, _) = select_all(listeners).await;
            debug!(%signal, "termination signal received");
            Trigger::Signal { signal }
        })
    }
}

#[cfg(unix)]
fn listen(signals: &[Signal]) -> Vec<BoxFuture<'static, Signal>> {
    signals
        .iter()
        .filter_map(|&signal| match tokio::signal::unix::signal(signal.kind()) {
            Ok(mut stream) => Some(
                async move {
                    if stream.recv().await.is_none() {
                        std::future::pending::<()>().await;
                    }
                    signal
                }
                .boxed(),
            ),
            Err(error) => {
                warn!(%signal, %error, "failed to install signal handler");
                None
            }
        })
        .collect()
}

#[cfg(not(unix))]
fn listen(signals: &[Signal]) -> Vec<BoxFuture<'static, Signal>> {
    signals
        .iter()
        .filter(|&&signal| signal == Signal::Interrupt)
        .map(|&signal| {
            async move {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    warn!(%signal, %error, "failed to install Ctrl-C handler");
                    std::future::pending::<()>().await;
                }
                signal
            }
            .boxed()
        })
        .collect()
}
