//! Timer sessions.
//!
//! A session is one start..stop interval of work on a task. Liveness is the
//! closed [`SessionState`] enum: a session is either `Active` or `Ended` with
//! its final figures, and it can end only once.

use serde::{Deserialize, Serialize};

/// How a session counts time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TimerMode {
    Countup,
    /// Counts towards `target_seconds`; elapsed is capped at the target.
    Countdown {
        #[serde(default)]
        target_seconds: Option<u64>,
    },
}

impl TimerMode {
    pub fn countdown(target_seconds: u64) -> Self {
        TimerMode::Countdown {
            target_seconds: Some(target_seconds),
        }
    }

    /// Target in seconds for countdown sessions that have one.
    pub fn target_seconds(&self) -> Option<u64> {
        match self {
            TimerMode::Countup => None,
            TimerMode::Countdown { target_seconds } => *target_seconds,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Countup => "countup",
            TimerMode::Countdown { .. } => "countdown",
        }
    }

    /// Rebuild from the storage columns.
    pub fn from_parts(mode: &str, target_seconds: Option<u64>) -> Option<Self> {
        match mode {
            "countup" => Some(TimerMode::Countup),
            "countdown" => Some(TimerMode::Countdown { target_seconds }),
            _ => None,
        }
    }

    /// Cap `elapsed_seconds` at the countdown target, if any.
    pub fn cap(&self, elapsed_seconds: u64) -> u64 {
        match self.target_seconds() {
            Some(target) => elapsed_seconds.min(target),
            None => elapsed_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Ended {
        ended_at: u64,
        elapsed_seconds: u64,
        earned_cents: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSession {
    pub id: String,
    pub task_id: String,
    pub project_id: String,
    pub member_id: String,
    pub mode: TimerMode,
    /// Epoch ms.
    pub started_at: u64,
    pub state: SessionState,
}

impl TimerSession {
    pub fn start(
        task_id: impl Into<String>,
        project_id: impl Into<String>,
        member_id: impl Into<String>,
        mode: TimerMode,
        started_at: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            project_id: project_id.into(),
            member_id: member_id.into(),
            mode,
            started_at,
            state: SessionState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    pub fn ended_at(&self) -> Option<u64> {
        match self.state {
            SessionState::Ended { ended_at, .. } => Some(ended_at),
            SessionState::Active => None,
        }
    }

    /// Whole seconds since `started_at`, capped at the countdown target.
    pub fn live_elapsed(&self, now_ms: u64) -> u64 {
        self.mode.cap(now_ms.saturating_sub(self.started_at) / 1000)
    }

    /// Whether a countdown session has reached its target at `now_ms`.
    pub fn target_reached(&self, now_ms: u64) -> bool {
        match self.mode.target_seconds() {
            Some(target) => now_ms.saturating_sub(self.started_at) / 1000 >= target,
            None => false,
        }
    }

    /// Finalize in memory. Returns `false` if the session had already ended.
    pub fn end(&mut self, ended_at: u64, elapsed_seconds: u64, earned_cents: u64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = SessionState::Ended {
            ended_at,
            elapsed_seconds,
            earned_cents,
        };
        true
    }
}
