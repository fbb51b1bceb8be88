//! Timer engine: the start / stop / advance use-cases.
//!
//! The engine is a wall-clock-based orchestrator. It does not use internal
//! threads - the owner (normally the [`super::Scheduler`]) calls
//! [`TimerEngine::advance`] once per elapsed second.
//!
//! ## Session lifecycle
//!
//! ```text
//! start ──> Active ──(stop | target reached | countdown expired | budget exhausted)──> Ended
//! ```
//!
//! Both transitions are idempotent: starting a task that already has an
//! active session returns that session, and stopping a task without one (or
//! whose session already ended) leaves it untouched.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = TimerEngine::new(Database::open()?, Arc::new(SystemClock), TimerSettings::default());
//! let session = engine.start(&StartRequest::countup("task-1", "me"))?;
//! // once per second:
//! engine.advance()?;
//! engine.stop(&StopRequest::task("task-1"))?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::countdown;
use super::live::LiveSnapshot;
use super::session::{TimerMode, TimerSession};
use crate::error::{CoreError, Result, TimerError, ValidationError};
use crate::events::{ChangeBus, Event, Resource};
use crate::notify::{show_best_effort, NoopNotifier, NotificationOptions, Notifier};
use crate::storage::{StopCommit, TimerStore};
use crate::task::{earned_cents, Task, TaskStatus};
use crate::workday::{WorkingDay, DEFAULT_DAILY_BUDGET_SECONDS};

/// Configuration inputs of the timer core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// Rate for tasks without their own, in cents per hour.
    pub default_hourly_rate_cents: u64,
    pub daily_budget_seconds: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            default_hourly_rate_cents: 0,
            daily_budget_seconds: DEFAULT_DAILY_BUDGET_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop by the user.
    User,
    /// Countdown-mode session hit its target.
    TargetReached,
    /// The task's estimated-time countdown ran out.
    CountdownExpired,
    /// The working-day budget is used up.
    BudgetExhausted,
    /// The session's task was no longer running, e.g. after its record was
    /// replaced by an import.
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub task_id: String,
    pub member_id: String,
    pub mode: TimerMode,
}

impl StartRequest {
    pub fn countup(task_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            member_id: member_id.into(),
            mode: TimerMode::Countup,
        }
    }

    pub fn countdown(
        task_id: impl Into<String>,
        member_id: impl Into<String>,
        target_seconds: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            member_id: member_id.into(),
            mode: TimerMode::countdown(target_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopRequest {
    /// Stop whatever session is active for the task.
    Task { task_id: String },
    /// Stop a specific session.
    Session { session_id: String, task_id: String },
}

impl StopRequest {
    pub fn task(task_id: impl Into<String>) -> Self {
        StopRequest::Task {
            task_id: task_id.into(),
        }
    }

    pub fn session(session_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        StopRequest::Session {
            session_id: session_id.into(),
            task_id: task_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            StopRequest::Task { task_id } | StopRequest::Session { task_id, .. } => task_id,
        }
    }
}

/// A session ended by a stop call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoppedSession {
    pub task_id: String,
    pub session_id: String,
    pub reason: StopReason,
    pub elapsed_seconds: u64,
    pub earned_cents: u64,
    /// Countdown remaining at the moment of the stop, for tasks with one.
    pub countdown_remaining_sec: Option<u64>,
}

/// Result of a stop call.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub task: Task,
    /// `None` when there was nothing to stop.
    pub stopped: Option<StoppedSession>,
}

/// Live figures written for a session that keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub task_id: String,
    pub session_id: String,
    pub current_time_seconds: u64,
    pub current_cents: u64,
    pub countdown_remaining_sec: Option<u64>,
}

/// What one advance step did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvanceReport {
    /// Whether the working-day budget was decremented.
    pub decremented: bool,
    /// Budget left after the step; `None` when there was no active work.
    pub remaining_seconds: Option<u64>,
    pub updates: Vec<LiveUpdate>,
    pub stopped: Vec<StoppedSession>,
    pub events: Vec<Event>,
    /// Sessions whose processing failed this step.
    pub failures: usize,
}

impl AdvanceReport {
    fn record_stop(&mut self, outcome: StopOutcome, event: Option<Event>) {
        if let Some(stopped) = outcome.stopped {
            self.stopped.push(stopped);
        }
        self.events.extend(event);
    }

    pub fn is_idle(&self) -> bool {
        self.remaining_seconds.is_none()
    }
}

/// The timer core.
pub struct TimerEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    notifier: Box<dyn Notifier>,
    changes: ChangeBus,
    settings: TimerSettings,
}

impl<S: TimerStore> TimerEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, settings: TimerSettings) -> Self {
        Self {
            store,
            clock,
            notifier: Box::new(NoopNotifier),
            changes: ChangeBus::new(),
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_change_bus(mut self, changes: ChangeBus) -> Self {
        self.changes = changes;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn changes(&self) -> &ChangeBus {
        &self.changes
    }

    pub fn settings(&self) -> TimerSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: TimerSettings) {
        self.settings = settings;
    }

    /// Per-task tick as a read model: live figures recomputed from the
    /// clock, nothing written.
    ///
    /// `None` when the task is missing or not running; both are expected
    /// while a stop races the display refresh.
    pub fn live(&self, task_id: &str) -> Result<Option<LiveSnapshot>> {
        let Some(task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        if !task.is_running() {
            return Ok(None);
        }
        let session = self.store.active_session_for_task(task_id)?;
        Ok(Some(LiveSnapshot::compute(
            &task,
            session.as_ref(),
            self.clock.now_ms(),
            self.settings.default_hourly_rate_cents,
        )))
    }

    /// Live snapshot of every task, running or not.
    pub fn snapshot_all(&self) -> Result<Vec<LiveSnapshot>> {
        let now = self.clock.now_ms();
        let active = self.store.active_sessions()?;
        let tasks = self.store.list_tasks()?;
        Ok(tasks
            .iter()
            .map(|task| {
                let session = active.iter().find(|s| s.task_id == task.id);
                LiveSnapshot::compute(task, session, now, self.settings.default_hourly_rate_cents)
            })
            .collect())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start timing a task.
    ///
    /// Returns the already-active session unchanged if there is one.
    ///
    /// # Errors
    /// `TimerError::TaskNotFound` for an unknown task; storage failures.
    pub fn start(&self, request: &StartRequest) -> Result<TimerSession> {
        if let Some(active) = self.store.active_session_for_task(&request.task_id)? {
            tracing::debug!(task_id = %request.task_id, session_id = %active.id, "start ignored, session already active");
            return Ok(active);
        }

        let mut task = self
            .store
            .get_task(&request.task_id)?
            .ok_or_else(|| TimerError::TaskNotFound(request.task_id.clone()))?;

        let now = self.clock.now_ms();
        task.mark_running(now);
        countdown::initialize(&mut task, now);

        let session = TimerSession::start(
            task.id.clone(),
            task.project_id.clone(),
            request.member_id.clone(),
            request.mode,
            now,
        );
        self.store.commit_start(&session, &task)?;

        tracing::info!(task_id = %task.id, session_id = %session.id, mode = session.mode.as_str(), "timer started");
        self.changes.emit(Resource::Sessions);
        self.changes.emit(Resource::Tasks);
        self.changes.publish(Event::TimerStarted {
            task_id: task.id,
            session_id: session.id.clone(),
            mode: session.mode,
            at_ms: now,
        });
        Ok(session)
    }

    /// Stop the timer of a task.
    ///
    /// Returns the task as it is after the call; unchanged when nothing was
    /// running.
    ///
    /// # Errors
    /// `TimerError::TaskNotFound` for an unknown task, `SessionNotFound` /
    /// `SessionTaskMismatch` for a bad explicit session id; storage failures.
    pub fn stop(&self, request: &StopRequest) -> Result<Task> {
        Ok(self.stop_with_reason(request, StopReason::User)?.0.task)
    }

    /// Stop with an explicit reason, returning the full outcome and the
    /// event published for it.
    pub fn stop_with_reason(
        &self,
        request: &StopRequest,
        reason: StopReason,
    ) -> Result<(StopOutcome, Option<Event>)> {
        let task_id = request.task_id();
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| TimerError::TaskNotFound(task_id.to_string()))?;

        let session = match request {
            StopRequest::Session { session_id, .. } => {
                let session = self
                    .store
                    .get_session(session_id)?
                    .ok_or_else(|| TimerError::SessionNotFound(session_id.clone()))?;
                if session.task_id != task_id {
                    return Err(TimerError::SessionTaskMismatch {
                        session_id: session_id.clone(),
                        task_id: task_id.to_string(),
                    }
                    .into());
                }
                Some(session)
            }
            StopRequest::Task { .. } => self.store.active_session_for_task(task_id)?,
        };

        let Some(session) = session.filter(|s| s.is_active()) else {
            tracing::debug!(task_id, "stop ignored, no active session");
            return Ok((StopOutcome { task, stopped: None }, None));
        };

        let now = self.clock.now_ms();
        let countdown_remaining_sec = task.countdown.map(|cd| cd.remaining_at(now));
        let (elapsed_seconds, earned) = match task.current_start_at {
            Some(start) => {
                let mut end = now;
                if reason == StopReason::CountdownExpired {
                    if let Some(cd) = task.countdown {
                        end = end.min(cd.expires_at_ms());
                    }
                }
                let elapsed = session.mode.cap(end.saturating_sub(start) / 1000);
                let rate = task.effective_rate_cents(self.settings.default_hourly_rate_cents);
                (elapsed, earned_cents(elapsed, rate))
            }
            None => {
                tracing::warn!(task_id, session_id = %session.id, "active session on a task that was never started, ending with zero");
                (0, 0)
            }
        };

        let commit = StopCommit {
            session_id: session.id.clone(),
            task_id: task.id.clone(),
            ended_at: now,
            elapsed_seconds,
            earned_cents: earned,
        };
        let Some(updated) = self.store.commit_stop(&commit)? else {
            // Ended by someone else between our read and our write.
            let current = self.store.get_task(task_id)?.unwrap_or(task);
            return Ok((StopOutcome { task: current, stopped: None }, None));
        };

        tracing::info!(
            task_id,
            session_id = %session.id,
            ?reason,
            elapsed_seconds,
            earned_cents = earned,
            "timer stopped"
        );
        self.changes.emit(Resource::Sessions);
        self.changes.emit(Resource::Tasks);
        let event = Event::TimerStopped {
            task_id: task_id.to_string(),
            session_id: session.id.clone(),
            reason,
            elapsed_seconds,
            earned_cents: earned,
            at_ms: now,
        };
        self.changes.publish(event.clone());

        Ok((
            StopOutcome {
                task: updated,
                stopped: Some(StoppedSession {
                    task_id: task_id.to_string(),
                    session_id: session.id,
                    reason,
                    elapsed_seconds,
                    earned_cents: earned,
                    countdown_remaining_sec,
                }),
            },
            Some(event),
        ))
    }

    /// Today's working day, created (or rolled over) on first access.
    ///
    /// A failed read is treated like a missing record.
    pub fn ensure_working_day(&self) -> Result<WorkingDay> {
        let today = self.clock.today();
        match self.store.working_day_for(today) {
            Ok(Some(day)) => return Ok(day),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "working day read failed, resetting"),
        }

        let budget = self.settings.daily_budget_seconds;
        let day = self.store.reset_working_day(today, budget)?;
        tracing::info!(day = %today, budget, "working day reset");
        self.changes.emit(Resource::WorkingDay);
        self.changes.publish(Event::WorkdayReset {
            day: today,
            daily_budget_seconds: budget,
        });
        Ok(day)
    }

    /// Replace today's budget with a fresh one.
    pub fn reset_working_day(&self) -> Result<WorkingDay> {
        let day = self
            .store
            .reset_working_day(self.clock.today(), self.settings.daily_budget_seconds)?;
        self.changes.emit(Resource::WorkingDay);
        Ok(day)
    }

    /// One second of active work: the authoritative tick.
    ///
    /// Decrements the working-day budget by one second if anything is
    /// running, refreshes live figures, and stops sessions whose countdown,
    /// target or budget ran out. Sessions whose task is no longer running are
    /// ended first and cost no budget. A failure on one session is logged and
    /// does not block the others.
    pub fn advance(&self) -> Result<AdvanceReport> {
        let mut report = AdvanceReport::default();

        let active = self.store.active_sessions()?;
        let active = self.end_orphans(active, &mut report);
        if active.is_empty() {
            return Ok(report);
        }

        let now = self.clock.now_ms();
        let Some(day) = self.charge_budget(&active, 1, now, &mut report)? else {
            return Ok(report);
        };

        for session in &active {
            if let Err(e) = self.advance_session(session, now, &mut report) {
                tracing::warn!(error = %e, task_id = %session.task_id, session_id = %session.id, "tick failed for session");
                report.failures += 1;
            }
        }

        if day.is_exhausted() {
            self.exhaust(&day, now, &mut report);
        }

        Ok(report)
    }

    /// Charge a block of seconds to the budget at once, for gaps too long
    /// to replay one advance at a time.
    ///
    /// Live fields are left to the next advance. Sessions are stopped if the
    /// budget runs out.
    pub fn charge_missed_seconds(&self, seconds: u64) -> Result<AdvanceReport> {
        let mut report = AdvanceReport::default();
        if seconds == 0 {
            return Ok(report);
        }
        let active = self.store.active_sessions()?;
        let active = self.end_orphans(active, &mut report);
        if active.is_empty() {
            return Ok(report);
        }

        let now = self.clock.now_ms();
        if let Some(day) = self.charge_budget(&active, seconds, now, &mut report)? {
            tracing::info!(seconds, remaining = day.remaining_seconds, "missed seconds charged to budget");
            if day.is_exhausted() {
                self.exhaust(&day, now, &mut report);
            }
        }
        Ok(report)
    }

    /// Decrement today's budget while `active` is running.
    ///
    /// `None` when nothing was charged: the budget was already gone (and
    /// `active` has been stopped) or the record vanished.
    fn charge_budget(
        &self,
        active: &[TimerSession],
        seconds: u64,
        now: u64,
        report: &mut AdvanceReport,
    ) -> Result<Option<WorkingDay>> {
        let day = self.ensure_working_day()?;
        report.remaining_seconds = Some(day.remaining_seconds);
        if day.is_exhausted() {
            tracing::info!(sessions = active.len(), "budget exhausted, stopping all sessions");
            self.stop_all(active, StopReason::BudgetExhausted, report);
            return Ok(None);
        }

        let Some(day) = self.store.decrement_working_day(day.day, seconds, now)? else {
            tracing::warn!("working day vanished during tick");
            return Ok(None);
        };
        report.decremented = true;
        report.remaining_seconds = Some(day.remaining_seconds);
        self.changes.emit(Resource::WorkingDay);
        Ok(Some(day))
    }

    fn exhaust(&self, day: &WorkingDay, now: u64, report: &mut AdvanceReport) {
        let event = Event::WorkdayExhausted { day: day.day, at_ms: now };
        self.changes.publish(event.clone());
        report.events.push(event);
        show_best_effort(
            self.notifier.as_ref(),
            "Workday budget used up",
            &NotificationOptions::new("All running timers have been stopped.").with_tag("workday"),
        );
        match self.store.active_sessions() {
            Ok(remaining) => self.stop_all(&remaining, StopReason::BudgetExhausted, report),
            Err(e) => {
                tracing::warn!(error = %e, "could not list sessions after budget ran out");
                report.failures += 1;
            }
        }
    }

    /// End sessions whose task exists but is not running, returning the rest.
    ///
    /// Sessions of missing tasks are kept so the per-session step reports
    /// them as failures.
    fn end_orphans(&self, sessions: Vec<TimerSession>, report: &mut AdvanceReport) -> Vec<TimerSession> {
        let mut live = Vec::with_capacity(sessions.len());
        for session in sessions {
            match self.store.get_task(&session.task_id) {
                Ok(Some(task)) if !task.is_running() => {
                    self.stop_all(std::slice::from_ref(&session), StopReason::Orphaned, report);
                }
                _ => live.push(session),
            }
        }
        live
    }

    fn advance_session(
        &self,
        session: &TimerSession,
        now: u64,
        report: &mut AdvanceReport,
    ) -> Result<()> {
        let request = StopRequest::session(session.id.clone(), session.task_id.clone());

        if session.target_reached(now) {
            let (outcome, event) = self.stop_with_reason(&request, StopReason::TargetReached)?;
            report.record_stop(outcome, event);
            return Ok(());
        }

        let Some(task) = self.store.get_task(&session.task_id)? else {
            return Err(TimerError::TaskNotFound(session.task_id.clone()).into());
        };

        let progress = countdown::task_progress(&task, now);
        if let Some(progress) = progress.filter(|p| p.is_expired) {
            let event = Event::CountdownExpired {
                task_id: task.id.clone(),
                estimated_seconds: progress.estimated_seconds,
                at_ms: now,
            };
            self.changes.publish(event.clone());
            report.events.push(event);
            show_best_effort(
                self.notifier.as_ref(),
                "Countdown finished",
                &NotificationOptions::new(format!("Time is up for \"{}\"", task.title))
                    .with_tag(task.id.clone()),
            );
            let (outcome, event) = self.stop_with_reason(&request, StopReason::CountdownExpired)?;
            report.record_stop(outcome, event);
            return Ok(());
        }

        let current_time_seconds = session.live_elapsed(now);
        let current_cents = earned_cents(
            current_time_seconds,
            task.effective_rate_cents(self.settings.default_hourly_rate_cents),
        );
        self.store
            .update_live(&task.id, current_time_seconds, current_cents)?;
        self.changes.emit(Resource::Tasks);
        tracing::debug!(task_id = %task.id, current_time_seconds, current_cents, "live fields updated");

        report.updates.push(LiveUpdate {
            task_id: task.id,
            session_id: session.id.clone(),
            current_time_seconds,
            current_cents,
            countdown_remaining_sec: progress.map(|p| p.remaining_seconds),
        });
        Ok(())
    }

    fn stop_all(&self, sessions: &[TimerSession], reason: StopReason, report: &mut AdvanceReport) {
        for session in sessions {
            let request = StopRequest::session(session.id.clone(), session.task_id.clone());
            match self.stop_with_reason(&request, reason) {
                Ok((outcome, event)) => report.record_stop(outcome, event),
                Err(e) => {
                    tracing::warn!(error = %e, session_id = %session.id, "auto-stop failed");
                    report.failures += 1;
                }
            }
        }
    }

    /// Re-anchor countdowns of running tasks on the wall clock and clear
    /// leftovers on stopped ones. Run once at process start.
    pub fn recover_countdowns(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut recovered = 0;
        for mut task in self.store.list_tasks()? {
            if countdown::recover(&mut task, now) {
                self.store.save_task(&task)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "countdown state recomputed");
            self.changes.emit(Resource::Tasks);
        }
        Ok(recovered)
    }

    // ── Task bookkeeping ─────────────────────────────────────────────

    /// Store imported task records, replacing existing ones by id.
    ///
    /// A task that is running is stopped first, so its time is booked and
    /// no session outlives the record it belonged to.
    pub fn import_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>> {
        for task in &tasks {
            if self.store.active_session_for_task(&task.id)?.is_some() {
                tracing::info!(task_id = %task.id, "stopping running task before import replaces it");
                self.stop(&StopRequest::task(task.id.clone()))?;
            }
            self.store.save_task(task)?;
        }
        if !tasks.is_empty() {
            tracing::info!(count = tasks.len(), "tasks imported");
            self.changes.emit(Resource::Tasks);
        }
        Ok(tasks)
    }

    /// Stop the timer if running, then mark the task completed.
    pub fn complete(&self, task_id: &str) -> Result<Task> {
        let mut task = self.stop(&StopRequest::task(task_id))?;
        task.status = TaskStatus::Completed;
        task.updated_at = chrono::Utc::now();
        self.store.save_task(&task)?;
        self.changes.emit(Resource::Tasks);
        Ok(task)
    }

    /// Zero the accumulated totals of a stopped task.
    pub fn reset_totals(&self, task_id: &str) -> Result<Task> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| TimerError::TaskNotFound(task_id.to_string()))?;
        if task.is_running() {
            return Err(ValidationError::TaskRunning(task_id.to_string()).into());
        }
        self.store.reset_totals(task_id)?;
        self.changes.emit(Resource::Tasks);
        self.store
            .get_task(task_id)?
            .ok_or_else(|| CoreError::from(TimerError::TaskNotFound(task_id.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SessionStore, TaskStore, WorkingDayStore};
    use crate::timer::ManualClock;

    const T0: u64 = 1_800_000_000_000;

    fn engine_with(task: Task, budget: u64) -> (TimerEngine<Database>, Arc<ManualClock>) {
        let db = Database::open_memory().unwrap();
        db.save_task(&task).unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let settings = TimerSettings {
            default_hourly_rate_cents: 1200,
            daily_budget_seconds: budget,
        };
        (TimerEngine::new(db, clock.clone(), settings), clock)
    }

    #[test]
    fn start_twice_returns_same_session() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        let first = engine.start(&StartRequest::countup("t", "m")).unwrap();
        let second = engine.start(&StartRequest::countup("t", "m")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(engine.store().list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn start_unknown_task_fails() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        let err = engine.start(&StartRequest::countup("nope", "m")).unwrap_err();
        assert!(matches!(err, CoreError::Timer(TimerError::TaskNotFound(_))));
    }

    #[test]
    fn start_marks_task_running_and_active() {
        let (engine, _) = engine_with(Task::new("t", "p", "x").with_estimate(2), 100);
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        let task = engine.store().get_task("t").unwrap().unwrap();
        assert_eq!(task.current_start_at, Some(T0));
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.countdown.unwrap().remaining_sec, 120);
    }

    #[test]
    fn stop_without_session_returns_task_unchanged() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        let before = engine.store().get_task("t").unwrap().unwrap();
        let after = engine.stop(&StopRequest::task("t")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn stop_unknown_task_fails() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        assert!(engine.stop(&StopRequest::task("nope")).is_err());
    }

    #[test]
    fn stop_with_foreign_session_id_is_rejected() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        engine.store().save_task(&Task::new("u", "p", "y")).unwrap();
        let session = engine.start(&StartRequest::countup("u", "m")).unwrap();
        let err = engine
            .stop(&StopRequest::session(session.id, "t"))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Timer(TimerError::SessionTaskMismatch { .. })
        ));
    }

    #[test]
    fn stop_of_never_started_task_ends_session_with_zero() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        // A session written without marking the task running.
        let orphan = TimerSession::start("t", "p", "m", TimerMode::Countup, T0);
        engine.store().create_session(&orphan).unwrap();

        let task = engine.stop(&StopRequest::task("t")).unwrap();
        assert_eq!(task.total_time_seconds, 0);
        let ended = engine.store().get_session(&orphan.id).unwrap().unwrap();
        assert!(matches!(
            ended.state,
            crate::timer::SessionState::Ended {
                elapsed_seconds: 0,
                earned_cents: 0,
                ..
            }
        ));
    }

    #[test]
    fn advance_with_no_sessions_keeps_budget() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        engine.ensure_working_day().unwrap();
        for _ in 0..5 {
            clock.advance_secs(1);
            assert!(engine.advance().unwrap().is_idle());
        }
        let wd = engine.ensure_working_day().unwrap();
        assert_eq!(wd.remaining_seconds, 100);
    }

    #[test]
    fn advance_updates_live_fields_only() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x").with_hourly_rate(3600), 100);
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        clock.advance_secs(3);
        let report = engine.advance().unwrap();
        assert!(report.decremented);
        assert_eq!(report.remaining_seconds, Some(99));
        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].current_time_seconds, 3);

        let task = engine.store().get_task("t").unwrap().unwrap();
        assert_eq!(task.current_time_seconds, 3);
        assert_eq!(task.current_cents, 3);
        assert_eq!(task.total_time_seconds, 0);
    }

    #[test]
    fn missed_seconds_are_only_charged_while_running() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        assert!(engine.charge_missed_seconds(40).unwrap().is_idle());
        assert_eq!(engine.ensure_working_day().unwrap().remaining_seconds, 100);

        engine.start(&StartRequest::countup("t", "m")).unwrap();
        let report = engine.charge_missed_seconds(40).unwrap();
        assert!(report.decremented);
        assert_eq!(report.remaining_seconds, Some(60));
        assert!(report.stopped.is_empty());
    }

    #[test]
    fn exhausted_budget_at_entry_stops_everything_without_decrement() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        let today = clock.today();
        engine
            .store()
            .save_working_day(&WorkingDay {
                day: today,
                daily_budget_seconds: 100,
                remaining_seconds: 0,
                started_at: None,
            })
            .unwrap();
        clock.advance_secs(1);
        let report = engine.advance().unwrap();
        assert!(!report.decremented);
        assert_eq!(report.stopped.len(), 1);
        assert_eq!(report.stopped[0].reason, StopReason::BudgetExhausted);
        assert!(engine.store().active_sessions().unwrap().is_empty());
    }

    #[test]
    fn stale_working_day_is_rolled_over() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        let yesterday = clock.today().pred_opt().unwrap();
        engine
            .store()
            .save_working_day(&WorkingDay::fresh(yesterday, 5))
            .unwrap();
        let wd = engine.ensure_working_day().unwrap();
        assert_eq!(wd.day, clock.today());
        assert_eq!(wd.remaining_seconds, 100);
    }

    #[test]
    fn complete_stops_running_timer() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        clock.advance_secs(10);
        let task = engine.complete("t").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.total_time_seconds, 10);
        assert!(!task.is_running());
    }

    #[test]
    fn reset_totals_refuses_running_task() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        assert!(engine.reset_totals("t").is_err());
        clock.advance_secs(4);
        engine.stop(&StopRequest::task("t")).unwrap();
        let task = engine.reset_totals("t").unwrap();
        assert_eq!(task.total_time_seconds, 0);
        assert_eq!(task.earnings_cents, 0);
    }

    #[test]
    fn live_is_none_for_idle_or_missing_task() {
        let (engine, _) = engine_with(Task::new("t", "p", "x"), 100);
        assert!(engine.live("t").unwrap().is_none());
        assert!(engine.live("missing").unwrap().is_none());
    }

    #[test]
    fn live_does_not_write() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        clock.advance_secs(7);
        let snap = engine.live("t").unwrap().unwrap();
        assert_eq!(snap.current_time_seconds, 7);
        let task = engine.store().get_task("t").unwrap().unwrap();
        assert_eq!(task.current_time_seconds, 0);
    }

    #[test]
    fn stop_publishes_event() {
        let (engine, clock) = engine_with(Task::new("t", "p", "x"), 100);
        let mut events = engine.changes().subscribe_events();
        engine.start(&StartRequest::countup("t", "m")).unwrap();
        clock.advance_secs(2);
        engine.stop(&StopRequest::task("t")).unwrap();
        assert!(matches!(events.try_recv().unwrap(), Event::TimerStarted { .. }));
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::TimerStopped {
                reason: StopReason::User,
                elapsed_seconds: 2,
                ..
            }
        ));
    }
}
