//! Database schema migrations for timeledger.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: tasks, sessions and the kv table.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id                      TEXT PRIMARY KEY,
            project_id              TEXT NOT NULL,
            title                   TEXT NOT NULL,
            status                  TEXT NOT NULL DEFAULT 'pending',
            total_time_seconds      INTEGER NOT NULL DEFAULT 0,
            earnings_cents          INTEGER NOT NULL DEFAULT 0,
            current_time_seconds    INTEGER NOT NULL DEFAULT 0,
            current_cents           INTEGER NOT NULL DEFAULT 0,
            current_start_at        INTEGER,
            hourly_rate_cents       INTEGER,
            estimated_minutes       INTEGER,
            countdown_remaining_sec INTEGER,
            countdown_started_at    INTEGER,
            assigned_member_ids     TEXT NOT NULL DEFAULT '[]',
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            task_id         TEXT NOT NULL,
            project_id      TEXT NOT NULL,
            member_id       TEXT NOT NULL,
            mode            TEXT NOT NULL,
            target_seconds  INTEGER,
            started_at      INTEGER NOT NULL,
            ended_at        INTEGER,
            elapsed_seconds INTEGER,
            earned_cents    INTEGER
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_task_id ON sessions(task_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: singleton working-day budget row.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS working_day (
            id                   INTEGER PRIMARY KEY CHECK (id = 1),
            day                  TEXT NOT NULL,
            daily_budget_seconds INTEGER NOT NULL,
            remaining_seconds    INTEGER NOT NULL CHECK (remaining_seconds >= 0),
            started_at           INTEGER
        );",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: at most one active session per task.
///
/// Sessions left active twice for the same task by older builds are closed
/// with zero figures before the index is created.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE sessions
         SET ended_at = started_at, elapsed_seconds = 0, earned_cents = 0
         WHERE ended_at IS NULL
           AND rowid NOT IN (
               SELECT MAX(rowid) FROM sessions WHERE ended_at IS NULL GROUP BY task_id
           )",
        [],
    )?;
    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active
         ON sessions(task_id) WHERE ended_at IS NULL;
         CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(ended_at);",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()
}
