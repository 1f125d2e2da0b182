//! The notify phase: scatter a notice to every participant, gather the
//! acknowledgements, and give up at the deadline.

use super::{ExitAction, Lifecycle, Manager};
use crate::notifier::{Notifier, NotifierOutcome, NotifierStatus};
use crate::report::ShutdownReport;
use crate::watcher::Trigger;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

impl Manager {
    pub(super) async fn shutdown_with(&self, trigger: Trigger) -> ShutdownReport {
        let mut done = {
            let mut session = self.inner.session.lock();
            if let Some(done) = session.as_ref() {
                debug!(%trigger, "shutdown already in progress; joining it");
                done.clone()
            } else {
                let (tx, done) = watch::channel(None);
                *session = Some(done.clone());

                let (notifiers, exit_action) = {
                    let mut registry = self.inner.registry.lock();
                    self.inner.lifecycle.send_replace(Lifecycle::ShuttingDown);
                    (registry.notifiers.clone(), registry.exit_action.take())
                };

                let manager = self.clone();
                tokio::spawn(async move {
                    let report = manager.run_session(trigger, notifiers, exit_action).await;
                    tx.send_replace(Some(report));
                });
                done
            }
        };

        loop {
            let current = done.borrow_and_update().clone();
            if let Some(report) = current {
                return report;
            }
            if done.changed().await.is_err() {
                // The session task only disappears when the runtime is shutting down.
                error!("shutdown session ended without a report");
                return std::future::pending().await;
            }
        }
    }

    async fn run_session(
        &self,
        trigger: Trigger,
        notifiers: Vec<Notifier>,
        exit_action: Option<ExitAction>,
    ) -> ShutdownReport {
        let session_id = Uuid::new_v4();
        let span = info_span!("shutdown", %session_id, %trigger);
        let started_at = Utc::now();
        let started = Instant::now();

        info!(
            parent: &span,
            notifiers = notifiers.len(),
            timeout = ?self.timeout(),
            "notifying participants"
        );
        let (outcomes, deadline_exceeded) =
            notify_all(&notifiers, session_id, &trigger, self.timeout())
                .instrument(span.clone())
                .await;

        let report = ShutdownReport {
            session_id,
            trigger,
            started_at,
            elapsed: started.elapsed(),
            deadline_exceeded,
            outcomes,
        };
        info!(
            parent: &span,
            elapsed = ?report.elapsed,
            acknowledged = report.acknowledged().len(),
            deadline_exceeded,
            "notify phase finished; running exit action"
        );

        span.in_scope(|| self.run_exit_action(exit_action));

        self.transition(Lifecycle::Exited);
        report
    }

    fn run_exit_action(&self, action: Option<ExitAction>) {
        let Some(action) = action else {
            let code = self.inner.config.exit_code;
            info!(code, "exiting process");
            std::process::exit(code);
        };

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(action)) {
            error!("Exit action panicked: {:?}", e);
        }
    }
}

/// Sends one notice per participant and waits for all of them or `timeout`.
///
/// Returns the outcomes in registration order and whether the deadline fired
/// first. Requests still in flight at the deadline keep running, but their
/// answers are ignored.
pub(super) async fn notify_all(
    notifiers: &[Notifier],
    session_id: Uuid,
    trigger: &Trigger,
    timeout: Duration,
) -> (Vec<NotifierOutcome>, bool) {
    let mut statuses = vec![NotifierStatus::TimedOut; notifiers.len()];
    let mut remaining = notifiers.len();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for (index, notifier) in notifiers.iter().cloned().enumerate() {
        let tx = tx.clone();
        let trigger = trigger.clone();
        tokio::spawn(
            async move {
                let status = notifier.request(session_id, trigger).await;
                debug!(notifier = notifier.name(), ?status, "participant answered");
                let _ = tx.send((index, status));
            }
            .in_current_span(),
        );
    }
    drop(tx);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    while remaining > 0 {
        tokio::select! {
            Some((index, status)) = rx.recv() => {
                statuses[index] = status;
                remaining -= 1;
            }
            () = &mut deadline => {
                let pending: Vec<&str> = notifiers
                    .iter()
                    .zip(&statuses)
                    .filter(|(_, status)| **status == NotifierStatus::TimedOut)
                    .map(|(notifier, _)| notifier.name())
                    .collect();
                warn!(?pending, ?timeout, "shutdown deadline reached before all participants acknowledged");
                break;
            }
        }
    }

    let outcomes = notifiers
        .iter()
        .zip(statuses)
        .map(|(notifier, status)| NotifierOutcome {
            name: notifier.name().to_string(),
            status,
        })
        .collect();

    (outcomes, remaining > 0)
}
