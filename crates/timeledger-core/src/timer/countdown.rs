//! Countdown arithmetic for tasks with an estimated duration.

use serde::{Deserialize, Serialize};

use crate::task::{CountdownState, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownProgress {
    pub elapsed_seconds: u64,
    pub estimated_seconds: u64,
    pub remaining_seconds: u64,
    /// 0..=100, floored.
    pub progress_percentage: u8,
    pub is_expired: bool,
}

/// Progress of an `estimated_minutes` countdown started at `started_at_ms`.
pub fn progress(estimated_minutes: u32, started_at_ms: u64, now_ms: u64) -> CountdownProgress {
    let estimated_seconds = u64::from(estimated_minutes) * 60;
    let elapsed_seconds = now_ms.saturating_sub(started_at_ms) / 1000;
    let remaining_seconds = estimated_seconds.saturating_sub(elapsed_seconds);
    let progress_percentage = if estimated_seconds == 0 {
        100
    } else {
        (elapsed_seconds.saturating_mul(100) / estimated_seconds).min(100) as u8
    };
    CountdownProgress {
        elapsed_seconds,
        estimated_seconds,
        remaining_seconds,
        progress_percentage,
        is_expired: remaining_seconds == 0,
    }
}

/// Progress of a task's countdown at `now_ms`, honouring a resumed budget.
pub fn task_progress(task: &Task, now_ms: u64) -> Option<CountdownProgress> {
    let estimated_seconds = task.estimated_seconds()?;
    let state = task.countdown?;
    let remaining_seconds = state.remaining_at(now_ms);
    let elapsed_seconds = estimated_seconds.saturating_sub(remaining_seconds);
    Some(CountdownProgress {
        elapsed_seconds,
        estimated_seconds,
        remaining_seconds,
        progress_percentage: (elapsed_seconds.saturating_mul(100) / estimated_seconds).min(100) as u8,
        is_expired: remaining_seconds == 0,
    })
}

/// Set up the countdown for a session starting at `now_ms`.
///
/// A positive remaining value left from an earlier session is resumed;
/// otherwise the full estimate is used. Tasks without an estimate get their
/// countdown cleared.
pub fn initialize(task: &mut Task, now_ms: u64) {
    let Some(estimated_seconds) = task.estimated_seconds() else {
        reset(task);
        return;
    };
    let remaining_sec = match task.countdown {
        Some(saved) if saved.remaining_sec > 0 => saved.remaining_sec.min(estimated_seconds),
        _ => estimated_seconds,
    };
    task.countdown = Some(CountdownState {
        remaining_sec,
        started_at: now_ms,
    });
}

pub fn reset(task: &mut Task) {
    task.countdown = None;
}

/// Re-anchor a running task's countdown on the wall clock.
///
/// Used once at process start: the persisted remaining value may be stale
/// after a reload or a long sleep, so the remaining time is recomputed from
/// `started_at` and the anchor moved up to `now_ms`. Returns whether the task
/// changed.
pub fn recover(task: &mut Task, now_ms: u64) -> bool {
    if !task.is_running() {
        if task.countdown.is_some() {
            reset(task);
            return true;
        }
        return false;
    }
    let Some(state) = task.countdown else {
        return false;
    };
    // Whole seconds only, and never past zero, so the expiry instant is kept.
    let consumed = (now_ms.saturating_sub(state.started_at) / 1000).min(state.remaining_sec);
    if consumed == 0 {
        return false;
    }
    task.countdown = Some(CountdownState {
        remaining_sec: state.remaining_sec - consumed,
        started_at: state.started_at + consumed * 1000,
    });
    true
}
