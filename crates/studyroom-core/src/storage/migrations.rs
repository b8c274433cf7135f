//! Database schema migrations for studyroom.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration version.

use indoc::indoc;
use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current schema
/// version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
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
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or(0)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: Initial schema.
///
/// - `rooms` / `room_members`: the room directory; `current_session_id` on a
///   member row marks "studying now".
/// - `timer_state`: one row per room, the single source of truth for whether
///   the room timer is running. Mutated only via precondition updates.
/// - `study_sessions`: append-only ledger of start/stop intervals.
/// - `timer_events`: append-only audit trail of transitions.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(indoc! {"
        CREATE TABLE IF NOT EXISTS rooms (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_by  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS room_members (
            room_id             TEXT NOT NULL,
            user_id             TEXT NOT NULL,
            joined_at           TEXT NOT NULL,
            current_session_id  TEXT,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS timer_state (
            room_id             TEXT PRIMARY KEY,
            is_running          INTEGER NOT NULL DEFAULT 0,
            start_time          TEXT,
            pause_time          TEXT,
            total_paused_ms     INTEGER NOT NULL DEFAULT 0,
            current_session_id  TEXT,
            started_by          TEXT,
            version             INTEGER NOT NULL DEFAULT 0,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS study_sessions (
            id             TEXT PRIMARY KEY,
            user_id        TEXT NOT NULL,
            duration_secs  INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL,
            ended_at       TEXT
        );

        CREATE TABLE IF NOT EXISTS timer_events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id       TEXT NOT NULL,
            user_id       TEXT NOT NULL,
            action        TEXT NOT NULL,
            at            TEXT NOT NULL,
            elapsed_secs  INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_open
            ON study_sessions(user_id, ended_at);
        CREATE INDEX IF NOT EXISTS idx_events_room_at
            ON timer_events(room_id, at);
    "})?;

    set_schema_version(conn, 1)?;
    Ok(())
}
