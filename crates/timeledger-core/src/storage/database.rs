//! SQLite-backed storage for tasks, timer sessions and the working day.
//!
//! Provides persistent storage for:
//! - Task records with their accumulated and live figures
//! - Timer sessions
//! - The singleton working-day budget
//! - Key-value store for scheduler state (last tick, tick lease)
//!
//! Multi-row transitions (start, stop) are single SQLite transactions.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::migrations;
use super::repository::{
    SessionStore, StopCommit, StoreResult, TaskStore, TickLease, TickStateStore, TimerStore,
    WorkingDayStore,
};
use crate::error::DatabaseError;
use crate::task::{CountdownState, Task, TaskStatus};
use crate::timer::{SessionState, TimerMode, TimerSession};
use crate::workday::WorkingDay;

const LAST_TICK_KEY: &str = "last_tick_at";
const LEASE_KEY: &str = "tick_lease";
const DAY_FORMAT: &str = "%Y-%m-%d";

const TASK_COLUMNS: &str = "id, project_id, title, status, total_time_seconds, earnings_cents,
     current_time_seconds, current_cents, current_start_at, hourly_rate_cents,
     estimated_minutes, countdown_remaining_sec, countdown_started_at,
     assigned_member_ids, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, task_id, project_id, member_id, mode, target_seconds,
     started_at, ended_at, elapsed_seconds, earned_cents";

// === Helper Functions ===

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_task(row: &Row) -> Result<Task, rusqlite::Error> {
    let status_str: String = row.get(3)?;
    let remaining: Option<u64> = row.get(11)?;
    let countdown_started: Option<u64> = row.get(12)?;
    let members_json: String = row.get(13)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        status: TaskStatus::parse(&status_str).unwrap_or_default(),
        total_time_seconds: row.get(4)?,
        earnings_cents: row.get(5)?,
        current_time_seconds: row.get(6)?,
        current_cents: row.get(7)?,
        current_start_at: row.get(8)?,
        hourly_rate_cents: row.get(9)?,
        estimated_minutes: row.get(10)?,
        countdown: match (remaining, countdown_started) {
            (Some(remaining_sec), Some(started_at)) => Some(CountdownState {
                remaining_sec,
                started_at,
            }),
            _ => None,
        },
        assigned_member_ids: serde_json::from_str::<BTreeSet<String>>(&members_json)
            .unwrap_or_default(),
        created_at: parse_datetime_fallback(&created_at),
        updated_at: parse_datetime_fallback(&updated_at),
    })
}

fn row_to_session(row: &Row) -> Result<TimerSession, rusqlite::Error> {
    let mode_str: String = row.get(4)?;
    let target: Option<u64> = row.get(5)?;
    let ended_at: Option<u64> = row.get(7)?;

    let state = match ended_at {
        None => SessionState::Active,
        Some(ended_at) => SessionState::Ended {
            ended_at,
            elapsed_seconds: row.get::<_, Option<u64>>(8)?.unwrap_or(0),
            earned_cents: row.get::<_, Option<u64>>(9)?.unwrap_or(0),
        },
    };

    Ok(TimerSession {
        id: row.get(0)?,
        task_id: row.get(1)?,
        project_id: row.get(2)?,
        member_id: row.get(3)?,
        mode: TimerMode::from_parts(&mode_str, target).unwrap_or(TimerMode::Countup),
        started_at: row.get(6)?,
        state,
    })
}

fn row_to_working_day(row: &Row) -> Result<(String, WorkingDay), rusqlite::Error> {
    let day_str: String = row.get(0)?;
    let day = NaiveDate::parse_from_str(&day_str, DAY_FORMAT).unwrap_or_default();
    Ok((
        day_str,
        WorkingDay {
            day,
            daily_budget_seconds: row.get(1)?,
            remaining_seconds: row.get(2)?,
            started_at: row.get(3)?,
        },
    ))
}

fn write_task(conn: &Connection, task: &Task) -> StoreResult<()> {
    let members = serde_json::to_string(&task.assigned_member_ids).map_err(|e| {
        DatabaseError::CorruptRow {
            table: "tasks",
            message: e.to_string(),
        }
    })?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO tasks ({TASK_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            task.id,
            task.project_id,
            task.title,
            task.status.as_str(),
            task.total_time_seconds,
            task.earnings_cents,
            task.current_time_seconds,
            task.current_cents,
            task.current_start_at,
            task.hourly_rate_cents,
            task.estimated_minutes,
            task.countdown.map(|c| c.remaining_sec),
            task.countdown.map(|c| c.started_at),
            members,
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn read_task(conn: &Connection, id: &str) -> StoreResult<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

fn apply_stop_on(conn: &Connection, id: &str, delta_seconds: u64, delta_cents: u64) -> StoreResult<usize> {
    let changed = conn.execute(
        "UPDATE tasks
         SET total_time_seconds = total_time_seconds + ?2,
             earnings_cents = earnings_cents + ?3,
             current_time_seconds = 0,
             current_cents = 0,
             current_start_at = NULL,
             countdown_remaining_sec = NULL,
             countdown_started_at = NULL,
             updated_at = ?4
         WHERE id = ?1",
        params![id, delta_seconds, delta_cents, Utc::now().to_rfc3339()],
    )?;
    Ok(changed)
}

fn query_sessions(conn: &Connection, filter: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<TimerSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions {filter} ORDER BY started_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map(args, row_to_session)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

/// SQLite database for timer storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/timeledger/timeledger.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("timeledger.db"))
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // Another process may hold the write lock for a few ms while it ticks.
        conn.busy_timeout(std::time::Duration::from_millis(500))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Current holder of the tick lease, if any.
    pub fn current_lease(&self) -> StoreResult<Option<TickLease>> {
        Ok(self
            .kv_get(LEASE_KEY)?
            .and_then(|json| serde_json::from_str(&json).ok()))
    }
}

impl TaskStore for Database {
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        read_task(&self.conn, id)
    }

    fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    fn save_task(&self, task: &Task) -> StoreResult<()> {
        write_task(&self.conn, task)
    }

    fn delete_task(&self, id: &str) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM sessions WHERE task_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn update_live(&self, id: &str, current_time_seconds: u64, current_cents: u64) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE tasks SET current_time_seconds = ?2, current_cents = ?3
             WHERE id = ?1 AND current_start_at IS NOT NULL",
            params![id, current_time_seconds, current_cents],
        )?;
        Ok(())
    }

    fn apply_stop(&self, id: &str, delta_seconds: u64, delta_cents: u64) -> StoreResult<Option<Task>> {
        if apply_stop_on(&self.conn, id, delta_seconds, delta_cents)? == 0 {
            return Ok(None);
        }
        read_task(&self.conn, id)
    }

    fn reset_totals(&self, id: &str) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET total_time_seconds = 0, earnings_cents = 0, updated_at = ?2
             WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }
}

impl SessionStore for Database {
    fn get_session(&self, id: &str) -> StoreResult<Option<TimerSession>> {
        let session = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    fn active_session_for_task(&self, task_id: &str) -> StoreResult<Option<TimerSession>> {
        let mut active = query_sessions(
            &self.conn,
            "WHERE task_id = ?1 AND ended_at IS NULL",
            &[&task_id],
        )?;
        Ok(active.pop())
    }

    fn active_sessions(&self) -> StoreResult<Vec<TimerSession>> {
        query_sessions(&self.conn, "WHERE ended_at IS NULL", &[])
    }

    fn list_sessions(&self) -> StoreResult<Vec<TimerSession>> {
        query_sessions(&self.conn, "", &[])
    }

    fn sessions_for_task(&self, task_id: &str) -> StoreResult<Vec<TimerSession>> {
        query_sessions(&self.conn, "WHERE task_id = ?1", &[&task_id])
    }

    fn create_session(&self, session: &TimerSession) -> StoreResult<()> {
        insert_session(&self.conn, session)
    }

    fn end_session(
        &self,
        id: &str,
        ended_at: u64,
        elapsed_seconds: u64,
        earned_cents: u64,
    ) -> StoreResult<bool> {
        end_session_on(&self.conn, id, ended_at, elapsed_seconds, earned_cents)
    }
}

fn insert_session(conn: &Connection, session: &TimerSession) -> StoreResult<()> {
    let (ended_at, elapsed, earned) = match session.state {
        SessionState::Active => (None, None, None),
        SessionState::Ended {
            ended_at,
            elapsed_seconds,
            earned_cents,
        } => (Some(ended_at), Some(elapsed_seconds), Some(earned_cents)),
    };
    conn.execute(
        &format!(
            "INSERT INTO sessions ({SESSION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            session.id,
            session.task_id,
            session.project_id,
            session.member_id,
            session.mode.as_str(),
            session.mode.target_seconds(),
            session.started_at,
            ended_at,
            elapsed,
            earned,
        ],
    )?;
    Ok(())
}

fn end_session_on(
    conn: &Connection,
    id: &str,
    ended_at: u64,
    elapsed_seconds: u64,
    earned_cents: u64,
) -> StoreResult<bool> {
    let changed = conn.execute(
        "UPDATE sessions SET ended_at = ?2, elapsed_seconds = ?3, earned_cents = ?4
         WHERE id = ?1 AND ended_at IS NULL",
        params![id, ended_at, elapsed_seconds, earned_cents],
    )?;
    Ok(changed > 0)
}

impl WorkingDayStore for Database {
    fn working_day_for(&self, day: NaiveDate) -> StoreResult<Option<WorkingDay>> {
        let stored = self
            .conn
            .query_row(
                "SELECT day, daily_budget_seconds, remaining_seconds, started_at
                 FROM working_day WHERE id = 1",
                [],
                row_to_working_day,
            )
            .optional()?;
        let expected = day.format(DAY_FORMAT).to_string();
        Ok(stored.and_then(|(day_str, wd)| (day_str == expected).then_some(wd)))
    }

    fn save_working_day(&self, working_day: &WorkingDay) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO working_day
                 (id, day, daily_budget_seconds, remaining_seconds, started_at)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                working_day.day.format(DAY_FORMAT).to_string(),
                working_day.daily_budget_seconds,
                working_day.remaining_seconds,
                working_day.started_at,
            ],
        )?;
        Ok(())
    }

    fn decrement_working_day(
        &self,
        day: NaiveDate,
        seconds: u64,
        now_ms: u64,
    ) -> StoreResult<Option<WorkingDay>> {
        // Clamp in Rust: SQLite integers are signed.
        let seconds = seconds.min(i64::MAX as u64);
        self.conn.execute(
            "UPDATE working_day
             SET remaining_seconds = MAX(remaining_seconds - ?2, 0),
                 started_at = COALESCE(started_at, ?3)
             WHERE id = 1 AND day = ?1",
            params![day.format(DAY_FORMAT).to_string(), seconds, now_ms],
        )?;
        self.working_day_for(day)
    }

    fn reset_working_day(&self, day: NaiveDate, daily_budget_seconds: u64) -> StoreResult<WorkingDay> {
        let fresh = WorkingDay::fresh(day, daily_budget_seconds);
        self.save_working_day(&fresh)?;
        Ok(fresh)
    }
}

impl TickStateStore for Database {
    fn last_tick_at(&self) -> StoreResult<Option<u64>> {
        Ok(self
            .kv_get(LAST_TICK_KEY)?
            .and_then(|v| v.parse::<u64>().ok()))
    }

    fn set_last_tick_at(&self, epoch_ms: u64) -> StoreResult<()> {
        self.kv_set(LAST_TICK_KEY, &epoch_ms.to_string())?;
        Ok(())
    }

    fn try_acquire_lease(&self, owner: &str, now_ms: u64, ttl_ms: u64) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let current: Option<TickLease> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![LEASE_KEY], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .and_then(|json| serde_json::from_str(&json).ok());

        let free = match &current {
            None => true,
            Some(lease) => lease.owner == owner || lease.expires_at_ms <= now_ms,
        };
        if !free {
            return Ok(false);
        }

        let lease = TickLease {
            owner: owner.to_string(),
            expires_at_ms: now_ms.saturating_add(ttl_ms),
        };
        let json = serde_json::to_string(&lease).map_err(|e| DatabaseError::CorruptRow {
            table: "kv",
            message: e.to_string(),
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![LEASE_KEY, json],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn release_lease(&self, owner: &str) -> StoreResult<()> {
        if let Some(lease) = self.current_lease()? {
            if lease.owner == owner {
                self.conn
                    .execute("DELETE FROM kv WHERE key = ?1", params![LEASE_KEY])?;
            }
        }
        Ok(())
    }
}

impl TimerStore for Database {
    fn commit_start(&self, session: &TimerSession, task: &Task) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_session(&tx, session)?;
        write_task(&tx, task)?;
        tx.commit()?;
        Ok(())
    }

    fn commit_stop(&self, stop: &StopCommit) -> StoreResult<Option<Task>> {
        let tx = self.conn.unchecked_transaction()?;
        let ended = end_session_on(
            &tx,
            &stop.session_id,
            stop.ended_at,
            stop.elapsed_seconds,
            stop.earned_cents,
        )?;
        if !ended {
            // Already ended; dropping the transaction rolls it back.
            return Ok(None);
        }
        apply_stop_on(&tx, &stop.task_id, stop.elapsed_seconds, stop.earned_cents)?;
        let task = read_task(&tx, &stop.task_id)?;
        tx.commit()?;
        Ok(task)
    }
}
