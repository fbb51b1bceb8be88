//! Task records.
//!
//! A task carries two kinds of time/earnings figures:
//!
//! - persisted accumulators (`total_time_seconds`, `earnings_cents`) that only
//!   change when a session stops (or on an explicit reset), and
//! - live figures (`current_time_seconds`, `current_cents`) describing the
//!   session in progress. They are zero whenever no timer is running.
//!
//! `current_start_at` is the running flag: `Some` iff a session is running.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, never timed
    #[default]
    Pending,
    /// Has been worked on
    Active,
    /// Closed by the user
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "active" => Some(TaskStatus::Active),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// Countdown state of a task with an estimated duration.
///
/// `remaining_sec` is the budget left at the instant `started_at` (epoch ms).
/// The live remaining value is derived from the clock, see
/// [`crate::timer::countdown`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountdownState {
    pub remaining_sec: u64,
    pub started_at: u64,
}

impl CountdownState {
    /// Instant (epoch ms) at which the countdown reaches zero.
    pub fn expires_at_ms(&self) -> u64 {
        self.started_at.saturating_add(self.remaining_sec.saturating_mul(1000))
    }

    /// Seconds left at `now_ms`, floored at zero.
    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.started_at) / 1000;
        self.remaining_sec.saturating_sub(elapsed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub total_time_seconds: u64,
    #[serde(default)]
    pub earnings_cents: u64,
    #[serde(default)]
    pub current_time_seconds: u64,
    #[serde(default)]
    pub current_cents: u64,
    /// Epoch ms of the running session's start.
    #[serde(default)]
    pub current_start_at: Option<u64>,
    /// Per-task override of the default hourly rate.
    #[serde(default)]
    pub hourly_rate_cents: Option<u64>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub countdown: Option<CountdownState>,
    #[serde(default)]
    pub assigned_member_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A fresh pending task with zeroed accumulators.
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            total_time_seconds: 0,
            earnings_cents: 0,
            current_time_seconds: 0,
            current_cents: 0,
            current_start_at: None,
            hourly_rate_cents: None,
            estimated_minutes: None,
            countdown: None,
            assigned_member_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_hourly_rate(mut self, cents: u64) -> Self {
        self.hourly_rate_cents = Some(cents);
        self
    }

    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimated_minutes = Some(minutes);
        self
    }

    pub fn is_running(&self) -> bool {
        self.current_start_at.is_some()
    }

    /// Task override or the caller's default.
    pub fn effective_rate_cents(&self, default_rate_cents: u64) -> u64 {
        self.hourly_rate_cents.unwrap_or(default_rate_cents)
    }

    /// Estimated duration in seconds, if the task has one.
    pub fn estimated_seconds(&self) -> Option<u64> {
        self.estimated_minutes
            .filter(|m| *m > 0)
            .map(|m| u64::from(m) * 60)
    }

    /// Add a member; duplicates are ignored. Returns whether it was new.
    pub fn assign(&mut self, member_id: impl Into<String>) -> bool {
        self.assigned_member_ids.insert(member_id.into())
    }

    pub fn unassign(&mut self, member_id: &str) -> bool {
        self.assigned_member_ids.remove(member_id)
    }

    /// Mark running from `now_ms` with zeroed live figures.
    pub fn mark_running(&mut self, now_ms: u64) {
        self.current_start_at = Some(now_ms);
        self.current_time_seconds = 0;
        self.current_cents = 0;
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Active;
        }
        self.updated_at = Utc::now();
    }

    /// In-memory form of the storage-level apply-stop transition.
    pub fn apply_stop(&mut self, delta_seconds: u64, delta_cents: u64) {
        self.total_time_seconds = self.total_time_seconds.saturating_add(delta_seconds);
        self.earnings_cents = self.earnings_cents.saturating_add(delta_cents);
        self.current_time_seconds = 0;
        self.current_cents = 0;
        self.current_start_at = None;
        self.countdown = None;
        self.updated_at = Utc::now();
    }
}

/// Earnings for `elapsed_seconds` at `rate_cents` per hour, rounded half up.
pub fn earned_cents(elapsed_seconds: u64, rate_cents: u64) -> u64 {
    let product = u128::from(elapsed_seconds) * u128::from(rate_cents);
    ((product + 1800) / 3600) as u64
}
