//! Append-only ledger of study sessions.
//!
//! One row per contiguous studying interval. Rows are created with
//! `duration = 0` on start (or seeded with the carried-forward elapsed on
//! resume), closed with a final duration, and never deleted. A user may have
//! at most one open row at a time; the open is rejected at this boundary
//! rather than left to client discipline, since a second open row would
//! double-count study time.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result, StorageError};
use crate::storage::Database;
use crate::{SessionId, UserId};

/// One studying interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub id: SessionId,
    pub user_id: UserId,
    pub duration_secs: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Leaderboard row: total closed study time for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTotal {
    pub user_id: UserId,
    pub total_secs: i64,
    pub sessions: i64,
}

/// Read/write access to the study-session ledger.
#[derive(Clone)]
pub struct SessionLedger {
    db: Database,
}

impl SessionLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a fresh session with `duration = 0`.
    ///
    /// # Errors
    /// Fails with [`LedgerError::SessionAlreadyOpen`] if the user already has
    /// an open session.
    pub fn open(&self, user_id: &str) -> Result<SessionId> {
        self.open_at(user_id, Utc::now())
    }

    pub fn open_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<SessionId> {
        let conn = self.db.lock();
        open_tx(&conn, user_id, 0, now)
    }

    /// Close a session with its final duration.
    ///
    /// Idempotent: the first close wins `ended_at`, the duration is
    /// overwritten, and closing an already-closed session is never an error,
    /// so a retried request cannot corrupt history.
    pub fn close(&self, session_id: &str, final_duration_secs: i64) -> Result<()> {
        self.close_at(session_id, final_duration_secs, Utc::now())
    }

    pub fn close_at(
        &self,
        session_id: &str,
        final_duration_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.db.lock();
        close_tx(&conn, session_id, final_duration_secs, now)
    }

    /// Look up one session.
    pub fn get(&self, session_id: &str) -> Result<Option<StudySession>> {
        let conn = self.db.lock();
        let session = conn
            .query_row(
                "SELECT id, user_id, duration_secs, created_at, ended_at
                 FROM study_sessions WHERE id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(session)
    }

    /// All sessions for one user, newest first.
    pub fn sessions_for_user(&self, user_id: &str) -> Result<Vec<StudySession>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, duration_secs, created_at, ended_at
                 FROM study_sessions WHERE user_id = ?1
                 ORDER BY created_at DESC",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![user_id], row_to_session)
            .map_err(StorageError::from)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row.map_err(StorageError::from)?);
        }
        Ok(sessions)
    }

    /// Leaderboard aggregation: total closed study time per user, descending.
    pub fn totals_by_user(&self) -> Result<Vec<UserTotal>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, COALESCE(SUM(duration_secs), 0), COUNT(*)
                 FROM study_sessions
                 WHERE ended_at IS NOT NULL
                 GROUP BY user_id
                 ORDER BY SUM(duration_secs) DESC",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UserTotal {
                    user_id: row.get(0)?,
                    total_secs: row.get(1)?,
                    sessions: row.get(2)?,
                })
            })
            .map_err(StorageError::from)?;
        let mut totals = Vec::new();
        for row in rows {
            totals.push(row.map_err(StorageError::from)?);
        }
        Ok(totals)
    }
}

/// Insert a session row inside an existing transaction.
///
/// The `WHERE NOT EXISTS` precondition enforces one open session per user at
/// the storage layer, so two racing opens cannot both succeed.
pub(crate) fn open_tx(
    conn: &Connection,
    user_id: &str,
    seed_duration_secs: i64,
    now: DateTime<Utc>,
) -> Result<SessionId> {
    let id = Uuid::new_v4().to_string();
    let inserted = conn
        .execute(
            "INSERT INTO study_sessions (id, user_id, duration_secs, created_at)
             SELECT ?1, ?2, ?3, ?4
             WHERE NOT EXISTS (
                 SELECT 1 FROM study_sessions
                 WHERE user_id = ?2 AND ended_at IS NULL
             )",
            params![id, user_id, seed_duration_secs, now],
        )
        .map_err(StorageError::from)?;
    if inserted == 0 {
        return Err(LedgerError::SessionAlreadyOpen(user_id.to_string()).into());
    }
    Ok(id)
}

/// Close a session inside an existing transaction. Idempotent.
pub(crate) fn close_tx(
    conn: &Connection,
    session_id: &str,
    final_duration_secs: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE study_sessions
             SET duration_secs = ?2, ended_at = COALESCE(ended_at, ?3)
             WHERE id = ?1",
            params![session_id, final_duration_secs, now],
        )
        .map_err(StorageError::from)?;
    if updated == 0 {
        return Err(LedgerError::UnknownSession(session_id.to_string()).into());
    }
    Ok(())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudySession> {
    Ok(StudySession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        duration_secs: row.get(2)?,
        created_at: row.get(3)?,
        ended_at: row.get(4)?,
    })
}
