//! Cleanup participants and the acknowledgement handshake.
//!
//! A participant holds a [`ShutdownListener`]; the manager holds the matching
//! [`Notifier`] endpoint. When shutdown begins, the manager sends one
//! [`ShutdownNotice`] per endpoint and waits for it to be acknowledged:
//!
//! ```rust,ignore
//! let listener = manager.notifier("db-pool")?;
//! tokio::spawn(listener.cleanup_on_shutdown(|_trigger| async move {
//!     pool.close().await;
//! }));
//! ```

use crate::watcher::Trigger;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Request sent to a participant when shutdown begins.
///
/// Call [`acknowledge`](Self::acknowledge) once cleanup is done. Dropping the
/// notice without acknowledging tells the manager to stop waiting for this
/// participant.
#[derive(Debug)]
pub struct ShutdownNotice {
    session_id: Uuid,
    trigger: Trigger,
    ack: oneshot::Sender<()>,
}

impl ShutdownNotice {
    /// Returns the id of the shutdown session that sent this notice.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns what caused the shutdown.
    #[must_use]
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Signals that cleanup has finished.
    pub fn acknowledge(self) {
        // The manager may already have given up on us after its deadline.
        let _ = self.ack.send(());
    }
}

/// Manager-side endpoint of a cleanup participant.
#[derive(Debug, Clone)]
pub struct Notifier {
    name: Arc<str>,
    sender: mpsc::Sender<ShutdownNotice>,
}

impl Notifier {
    /// Returns the participant name used in logs and reports.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the listener side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends a notice and waits for the participant to answer.
    pub(crate) async fn request(&self, session_id: Uuid, trigger: Trigger) -> NotifierStatus {
        let (ack, done) = oneshot::channel();
        let notice = ShutdownNotice {
            session_id,
            trigger,
            ack,
        };

        if self.sender.send(notice).await.is_err() {
            return NotifierStatus::Unreachable;
        }

        match done.await {
            Ok(()) => NotifierStatus::Acknowledged,
            Err(_) => NotifierStatus::Abandoned,
        }
    }
}

/// Participant-side endpoint that receives the [`ShutdownNotice`].
#[derive(Debug)]
pub struct ShutdownListener {
    receiver: mpsc::Receiver<ShutdownNotice>,
}

impl ShutdownListener {
    /// Waits for the shutdown notice.
    ///
    /// Returns `None` once every [`Notifier`] clone has been dropped.
    pub async fn recv(&mut self) -> Option<ShutdownNotice> {
        self.receiver.recv().await
    }

    /// Returns the notice if one is already pending.
    pub fn try_recv(&mut self) -> Option<ShutdownNotice> {
        self.receiver.try_recv().ok()
    }

    /// Waits for the notice, runs `cleanup`, then acknowledges.
    ///
    /// Returns false if the manager went away without sending a notice.
    pub async fn cleanup_on_shutdown<F, Fut>(mut self, cleanup: F) -> bool
    where
        F: FnOnce(Trigger) -> Fut,
        Fut: Future<Output = ()>,
    {
        let Some(notice) = self.recv().await else {
            return false;
        };
        cleanup(notice.trigger().clone()).await;
        notice.acknowledge();
        true
    }
}

/// Creates a named endpoint pair for one cleanup participant.
#[must_use]
pub fn notifier(name: impl Into<String>) -> (Notifier, ShutdownListener) {
    let name: String = name.into();
    let (sender, receiver) = mpsc::channel(1);
    (
        Notifier {
            name: name.into(),
            sender,
        },
        ShutdownListener { receiver },
    )
}

/// How a participant answered during a shutdown session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierStatus {
    /// The participant acknowledged before the deadline.
    Acknowledged,
    /// The deadline fired before the participant acknowledged.
    TimedOut,
    /// The listener was gone, so the notice could not be delivered.
    Unreachable,
    /// The notice was delivered and then dropped without acknowledgement.
    Abandoned,
}

/// Outcome for a single registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifierOutcome {
    /// Participant name.
    pub name: String,
    /// What happened.
    pub status: NotifierStatus,
}
