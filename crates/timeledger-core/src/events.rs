use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::timer::{StopReason, TimerMode};

/// Every state change of the timer core produces an Event.
/// The CLI prints them; other callers may log or forward them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        task_id: String,
        session_id: String,
        mode: TimerMode,
        at_ms: u64,
    },
    TimerStopped {
        task_id: String,
        session_id: String,
        reason: StopReason,
        elapsed_seconds: u64,
        earned_cents: u64,
        at_ms: u64,
    },
    CountdownExpired {
        task_id: String,
        estimated_seconds: u64,
        at_ms: u64,
    },
    /// The working-day budget hit zero.
    WorkdayExhausted {
        day: chrono::NaiveDate,
        at_ms: u64,
    },
    /// A new day's budget was created.
    WorkdayReset {
        day: chrono::NaiveDate,
        daily_budget_seconds: u64,
    },
}

/// Logical resources other processes may want to re-read after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Tasks,
    Sessions,
    WorkingDay,
    Members,
    Settings,
}

/// Best-effort change notification.
///
/// One [`Resource`] signal per durable write, plus the [`Event`] stream.
/// Sending never fails the caller: with no subscribers the message is
/// simply dropped.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    resources: broadcast::Sender<Resource>,
    events: broadcast::Sender<Event>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (resources, _) = broadcast::channel(64);
        let (events, _) = broadcast::channel(256);
        Self { resources, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Resource> {
        self.resources.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn emit(&self, resource: Resource) {
        if self.resources.send(resource).is_err() {
            tracing::trace!(?resource, "change signal dropped, no subscribers");
        }
    }

    pub fn publish(&self, event: Event) {
        if let Err(broadcast::error::SendError(event)) = self.events.send(event) {
            tracing::trace!(?event, "event dropped, no subscribers");
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
