//! Read model: persisted totals plus the in-progress delta.
//!
//! Nothing here writes. The advance step is the only writer of live fields;
//! display code recomputes from the clock with [`LiveSnapshot::compute`].

use serde::{Deserialize, Serialize};

use super::countdown::{self, CountdownProgress};
use super::session::TimerSession;
use crate::task::{earned_cents, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub task_id: String,
    pub running: bool,
    pub session_id: Option<String>,
    pub current_time_seconds: u64,
    pub current_cents: u64,
    /// Persisted total plus the running delta.
    pub total_time_seconds: u64,
    pub earnings_cents: u64,
    pub countdown: Option<CountdownProgress>,
}

impl LiveSnapshot {
    pub fn compute(
        task: &Task,
        session: Option<&TimerSession>,
        now_ms: u64,
        default_rate_cents: u64,
    ) -> Self {
        let (current_time_seconds, current_cents) = match task.current_start_at {
            Some(start) => {
                let raw = now_ms.saturating_sub(start) / 1000;
                let elapsed = match session {
                    Some(s) => s.mode.cap(raw),
                    None => raw,
                };
                let rate = task.effective_rate_cents(default_rate_cents);
                (elapsed, earned_cents(elapsed, rate))
            }
            None => (0, 0),
        };

        Self {
            task_id: task.id.clone(),
            running: task.is_running(),
            session_id: session.filter(|s| s.is_active()).map(|s| s.id.clone()),
            current_time_seconds,
            current_cents,
            total_time_seconds: task.total_time_seconds + current_time_seconds,
            earnings_cents: task.earnings_cents + current_cents,
            countdown: countdown::task_progress(task, now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerMode;

    #[test]
    fn idle_task_shows_persisted_totals() {
        let mut task = Task::new("t", "p", "x");
        task.total_time_seconds = 100;
        task.earnings_cents = 50;
        let snap = LiveSnapshot::compute(&task, None, 999_999, 6000);
        assert!(!snap.running);
        assert_eq!(snap.current_time_seconds, 0);
        assert_eq!(snap.total_time_seconds, 100);
        assert_eq!(snap.earnings_cents, 50);
    }

    #[test]
    fn running_task_adds_live_delta() {
        let mut task = Task::new("t", "p", "x").with_hourly_rate(3600);
        task.total_time_seconds = 10;
        task.mark_running(0);
        let session = TimerSession::start("t", "p", "m", TimerMode::Countup, 0);
        let snap = LiveSnapshot::compute(&task, Some(&session), 30_999, 0);
        assert_eq!(snap.current_time_seconds, 30);
        assert_eq!(snap.current_cents, 30);
        assert_eq!(snap.total_time_seconds, 40);
        assert_eq!(snap.session_id.as_deref(), Some(session.id.as_str()));
    }

    #[test]
    fn countdown_session_is_capped() {
        let mut task = Task::new("t", "p", "x");
        task.mark_running(0);
        let session = TimerSession::start("t", "p", "m", TimerMode::countdown(5), 0);
        let snap = LiveSnapshot::compute(&task, Some(&session), 60_000, 0);
        assert_eq!(snap.current_time_seconds, 5);
    }
}
