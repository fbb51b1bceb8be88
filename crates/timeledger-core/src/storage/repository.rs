//! Persistence interfaces consumed by the timer engine.
//!
//! [`crate::storage::Database`] implements all of them on SQLite. The engine
//! only ever sees these traits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::task::Task;
use crate::timer::TimerSession;
use crate::workday::WorkingDay;

pub type StoreResult<T> = Result<T, DatabaseError>;

pub trait TaskStore {
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>>;

    fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Insert or replace the whole record.
    fn save_task(&self, task: &Task) -> StoreResult<()>;

    fn delete_task(&self, id: &str) -> StoreResult<bool>;

    /// Write only the live figures; totals are never touched.
    fn update_live(&self, id: &str, current_time_seconds: u64, current_cents: u64) -> StoreResult<()>;

    /// Accumulate the deltas into the totals and clear every piece of live
    /// state, as one statement. Returns the updated task.
    fn apply_stop(&self, id: &str, delta_seconds: u64, delta_cents: u64) -> StoreResult<Option<Task>>;

    /// Zero the accumulators.
    fn reset_totals(&self, id: &str) -> StoreResult<bool>;
}

pub trait SessionStore {
    fn get_session(&self, id: &str) -> StoreResult<Option<TimerSession>>;

    /// The unique active session of a task.
    fn active_session_for_task(&self, task_id: &str) -> StoreResult<Option<TimerSession>>;

    fn active_sessions(&self) -> StoreResult<Vec<TimerSession>>;

    fn list_sessions(&self) -> StoreResult<Vec<TimerSession>>;

    fn sessions_for_task(&self, task_id: &str) -> StoreResult<Vec<TimerSession>>;

    fn create_session(&self, session: &TimerSession) -> StoreResult<()>;

    /// Finalize an active session. Returns `false` when it had already ended.
    fn end_session(
        &self,
        id: &str,
        ended_at: u64,
        elapsed_seconds: u64,
        earned_cents: u64,
    ) -> StoreResult<bool>;
}

pub trait WorkingDayStore {
    /// The stored record if it belongs to `day`.
    fn working_day_for(&self, day: NaiveDate) -> StoreResult<Option<WorkingDay>>;

    fn save_working_day(&self, working_day: &WorkingDay) -> StoreResult<()>;

    /// Subtract `seconds` (floored at zero) from the record of `day`.
    fn decrement_working_day(
        &self,
        day: NaiveDate,
        seconds: u64,
        now_ms: u64,
    ) -> StoreResult<Option<WorkingDay>>;

    fn reset_working_day(&self, day: NaiveDate, daily_budget_seconds: u64) -> StoreResult<WorkingDay>;
}

/// Scheduler bookkeeping that has to survive restarts.
pub trait TickStateStore {
    fn last_tick_at(&self) -> StoreResult<Option<u64>>;

    fn set_last_tick_at(&self, epoch_ms: u64) -> StoreResult<()>;

    /// Take or renew the tick lease. Returns whether `owner` holds it now.
    fn try_acquire_lease(&self, owner: &str, now_ms: u64, ttl_ms: u64) -> StoreResult<bool>;

    fn release_lease(&self, owner: &str) -> StoreResult<()>;
}

/// Holder of the tick lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickLease {
    pub owner: String,
    pub expires_at_ms: u64,
}

/// Everything the stop transition writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCommit {
    pub session_id: String,
    pub task_id: String,
    pub ended_at: u64,
    pub elapsed_seconds: u64,
    pub earned_cents: u64,
}

/// The full store the engine runs against.
pub trait TimerStore: TaskStore + SessionStore + WorkingDayStore + TickStateStore {
    /// Create the session and save the running task together.
    fn commit_start(&self, session: &TimerSession, task: &Task) -> StoreResult<()>;

    /// End the session and apply-stop the task together.
    ///
    /// Returns `None` without writing anything if the session had already
    /// ended.
    fn commit_stop(&self, stop: &StopCommit) -> StoreResult<Option<Task>>;
}
