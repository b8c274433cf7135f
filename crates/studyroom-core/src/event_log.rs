//! Append-only audit trail of timer transitions.
//!
//! One row per start/pause/resume/reset, used for timeline display ("alice
//! started the timer"). Write-once; there is no update or delete surface, and
//! the log is never read back to reconstruct timer state -- the timer row is
//! always authoritative on its own.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::storage::Database;
use crate::timer::TimerAction;
use crate::{RoomId, UserId};

/// One recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEvent {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub action: TimerAction,
    pub at: DateTime<Utc>,
    /// Elapsed snapshot at the moment of the transition; set for pause and
    /// reset.
    pub elapsed_secs: Option<i64>,
}

/// Append/read access to the timer event log.
#[derive(Clone)]
pub struct EventLog {
    db: Database,
}

impl EventLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one transition record.
    pub fn record(
        &self,
        room_id: &str,
        user_id: &str,
        action: TimerAction,
        elapsed_secs: Option<i64>,
    ) -> Result<i64> {
        let conn = self.db.lock();
        record_tx(&conn, room_id, user_id, action, Utc::now(), elapsed_secs)
    }

    /// Most recent transitions for a room, newest first.
    pub fn timeline(&self, room_id: &str, limit: usize) -> Result<Vec<TimerEvent>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, room_id, user_id, action, at, elapsed_secs
                 FROM timer_events WHERE room_id = ?1
                 ORDER BY at DESC, id DESC LIMIT ?2",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![room_id, limit as i64], row_to_event)
            .map_err(StorageError::from)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(StorageError::from)?);
        }
        Ok(events)
    }
}

/// Append a transition record inside an existing transaction.
pub(crate) fn record_tx(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
    action: TimerAction,
    at: DateTime<Utc>,
    elapsed_secs: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO timer_events (room_id, user_id, action, at, elapsed_secs)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![room_id, user_id, action.as_str(), at, elapsed_secs],
    )
    .map_err(StorageError::from)?;
    Ok(conn.last_insert_rowid())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<TimerEvent> {
    let action_str: String = row.get(3)?;
    let action = TimerAction::parse(&action_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown timer action '{action_str}'").into(),
        )
    })?;
    Ok(TimerEvent {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        action,
        at: row.get(4)?,
        elapsed_secs: row.get(5)?,
    })
}
