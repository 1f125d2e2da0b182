//! Observable outcome of a shutdown session.

use crate::notifier::{NotifierOutcome, NotifierStatus};
use crate::watcher::Trigger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// What happened during a shutdown session.
///
/// Returned by [`Manager::shutdown`](crate::manager::Manager::shutdown). Every
/// caller that joins the same session receives the same report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShutdownReport {
    /// Unique id of the session, also carried by each notice.
    pub session_id: Uuid,
    /// What caused the shutdown.
    pub trigger: Trigger,
    /// When the notify phase began.
    pub started_at: DateTime<Utc>,
    /// Time from the start of the notify phase until the exit action ran.
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// True if the deadline fired while participants were still pending.
    pub deadline_exceeded: bool,
    /// One entry per registered participant, in registration order.
    pub outcomes: Vec<NotifierOutcome>,
}

impl ShutdownReport {
    /// Names of participants that acknowledged in time.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<&str> {
        self.with_status(NotifierStatus::Acknowledged)
    }

    /// Names of participants the manager stopped waiting for at the deadline.
    #[must_use]
    pub fn timed_out(&self) -> Vec<&str> {
        self.with_status(NotifierStatus::TimedOut)
    }

    /// Returns true if every participant acknowledged.
    #[must_use]
    pub fn all_acknowledged(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| outcome.status == NotifierStatus::Acknowledged)
    }

    /// Converts the report to a JSON value for structured logs.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn with_status(&self, status: NotifierStatus) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .map(|outcome| outcome.name.as_str())
            .collect()
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
