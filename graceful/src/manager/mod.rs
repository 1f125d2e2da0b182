//! The shutdown manager.
//!
//! A [`Manager`] collects trigger [`Watcher`]s and cleanup [`Notifier`]s,
//! then on [`start`](Manager::start) spawns an aggregation task that waits for
//! the first watcher to fire and runs [`shutdown`](Manager::shutdown).
//!
//! Lifecycle: `NotStarted -> Started -> ShuttingDown -> Exited`. Registration is
//! only accepted in `NotStarted`; every later attempt returns
//! [`ShutdownError::AlreadyStarted`] and leaves the registries untouched.
//!
//! Concurrent shutdown requests are serialized: the first one runs the notify
//! phase and the exit action, every other caller waits for it and receives the
//! same [`ShutdownReport`].

mod shutdown;

#[cfg(test)]
mod integration_tests;

use crate::cancellation::CancellationToken;
use crate::config::ShutdownConfig;
use crate::errors::{Result, ShutdownError};
use crate::notifier::{notifier, Notifier, ShutdownListener};
use crate::report::ShutdownReport;
use crate::watcher::{
    CancellationWatcher, ChannelWatcher, Signal, SignalWatcher, Trigger, WatchSignal, Watcher,
};
use futures::future::select_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Terminal action run once the notify phase is over.
pub type ExitAction = Box<dyn FnOnce() + Send>;

/// Lifecycle state of a [`Manager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Accepting registrations.
    NotStarted,
    /// Watching for a trigger.
    Started,
    /// Notifying participants.
    ShuttingDown,
    /// The exit action has run.
    Exited,
}

#[derive(Default)]
struct Registry {
    watchers: Vec<Arc<dyn Watcher>>,
    notifiers: Vec<Notifier>,
    /// `None` means the default action: exit with the configured status.
    exit_action: Option<ExitAction>,
}

struct Inner {
    config: ShutdownConfig,
    /// Guards registrations and every lifecycle transition.
    registry: Mutex<Registry>,
    lifecycle: watch::Sender<Lifecycle>,
    /// Completion signal of the one shutdown session, once it has begun.
    session: Mutex<Option<watch::Receiver<Option<ShutdownReport>>>>,
}

/// Coordinates orderly process termination.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    /// Creates a manager that waits at most `timeout` for notifiers.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(ShutdownConfig::new().with_timeout(timeout))
    }

    /// Creates a manager from a full configuration.
    #[must_use]
    pub fn with_config(config: ShutdownConfig) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::NotStarted);
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(Registry::default()),
                lifecycle,
                session: Mutex::new(None),
            }),
        }
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &ShutdownConfig {
        &self.inner.config
    }

    /// Returns the notify timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.config.timeout()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }

    /// Returns true once `start` (or a direct `shutdown`) has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.lifecycle() != Lifecycle::NotStarted
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.registry.lock().watchers.len()
    }

    /// Number of registered notifiers.
    #[must_use]
    pub fn notifier_count(&self) -> usize {
        self.inner.registry.lock().notifiers.len()
    }

    /// Registers a trigger source.
    pub fn register_watcher<W>(&self, watcher: W) -> Result<()>
    where
        W: Watcher + 'static,
    {
        self.register_shared_watcher(Arc::new(watcher))
    }

    /// Registers a trigger source that is shared with other owners.
    pub fn register_shared_watcher(&self, watcher: Arc<dyn Watcher>) -> Result<()> {
        self.with_registry(|registry| {
            registry.watchers.push(watcher);
            debug!(watchers = registry.watchers.len(), "watcher registered");
        })
    }

    /// Shuts down on the first delivery of any of `signals`.
    pub fn watch_signal(&self, signals: impl IntoIterator<Item = Signal>) -> Result<()> {
        self.register_watcher(SignalWatcher::new(signals))
    }

    /// Shuts down when `token` is cancelled.
    pub fn watch_context(&self, token: Arc<CancellationToken>) -> Result<()> {
        self.register_watcher(CancellationWatcher::new(token))
    }

    /// Shuts down when a value arrives on `receiver` or its senders are dropped.
    pub fn watch_channel<T>(&self, receiver: mpsc::Receiver<T>) -> Result<()>
    where
        T: Send + 'static,
    {
        self.register_watcher(ChannelWatcher::new(receiver))
    }

    /// Registers a cleanup participant and hands its endpoint back.
    pub fn register_notifier(&self, notifier: Notifier) -> Result<Notifier> {
        self.with_registry(|registry| {
            registry.notifiers.push(notifier.clone());
            debug!(notifier = notifier.name(), "notifier registered");
        })?;
        Ok(notifier)
    }

    /// Creates, registers and returns the listener for a new participant.
    pub fn notifier(&self, name: impl Into<String>) -> Result<ShutdownListener> {
        let (endpoint, listener) = notifier(name);
        self.register_notifier(endpoint)?;
        Ok(listener)
    }

    /// Replaces the exit action.
    ///
    /// The default action calls `std::process::exit` with the configured
    /// status.
    pub fn register_exit_action<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.with_registry(|registry| {
            registry.exit_action = Some(Box::new(action));
        })
    }

    /// Starts watching for triggers.
    ///
    /// Returns immediately; the aggregation loop runs on a spawned task. A
    /// manager with no watchers never shuts down on its own.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime. The manager is left in
    /// `NotStarted` in that case.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::current();
        let (watchers, notifiers) = {
            let registry = self.inner.registry.lock();
            if self.is_started() {
                return Err(ShutdownError::AlreadyStarted);
            }
            self.inner.lifecycle.send_replace(Lifecycle::Started);
            (registry.watchers.clone(), registry.notifiers.len())
        };

        info!(
            watchers = watchers.len(),
            notifiers,
            timeout = ?self.timeout(),
            "shutdown manager started"
        );

        let manager = self.clone();
        runtime.spawn(async move { manager.watch_loop(watchers).await });
        Ok(())
    }

    /// Runs the shutdown protocol and then the exit action.
    ///
    /// Safe to call directly, concurrently with the aggregation loop, or more
    /// than once. Only the first call notifies participants and runs the exit
    /// action; the others wait for it to finish and return its report.
    ///
    /// The session runs on its own task, so dropping the returned future
    /// does not interrupt it: the exit action still runs once the notify
    /// phase ends.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with(Trigger::Manual).await
    }

    /// Waits until the exit action has run.
    pub async fn wait(&self) {
        let mut lifecycle = self.inner.lifecycle.subscribe();
        let _ = lifecycle
            .wait_for(|state| *state == Lifecycle::Exited)
            .await;
    }

    async fn watch_loop(self, watchers: Vec<Arc<dyn Watcher>>) {
        let signals: Vec<WatchSignal> = watchers.iter().map(|watcher| watcher.watch()).collect();

        match first_trigger(signals).await {
            Some(trigger) => {
                info!(%trigger, "shutdown triggered");
                self.shutdown_with(trigger).await;
            }
            None => debug!("no watcher can fire; waiting for a direct shutdown call"),
        }
    }

    /// Applies `f` to the registry if the manager has not started yet.
    fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> Result<T> {
        let mut registry = self.inner.registry.lock();
        if self.is_started() {
            return Err(ShutdownError::AlreadyStarted);
        }
        Ok(f(&mut registry))
    }

    fn transition(&self, state: Lifecycle) {
        let _registry = self.inner.registry.lock();
        self.inner.lifecycle.send_replace(state);
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.inner.config)
            .field("lifecycle", &self.lifecycle())
            .field("watchers", &self.watcher_count())
            .field("notifiers", &self.notifier_count())
            .finish()
    }
}

/// Resolves with the first trigger delivered by any watcher.
///
/// Watchers whose source was torn down are dropped from the race. Returns
/// `None` if no watcher can ever fire, including when there are none.
async fn first_trigger(mut pending: Vec<WatchSignal>) -> Option<Trigger> {
    while !pending.is_empty() {
        let (result, _, rest) = select_all(pending).await;
        match result {
            Ok(trigger) => return Some(trigger),
            Err(_) => pending = rest,
        }
    }
    None
}
