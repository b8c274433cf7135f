//! Room directory: membership and the "who is studying now" view.
//!
//! Membership scopes who may drive a room's timer. A member row optionally
//! points at the study session it is currently driving; that marker is set on
//! start/resume and cleared on pause/reset by the timer store.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result, StorageError};
use crate::storage::Database;
use crate::{RoomId, SessionId, UserId};

/// A shared study room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// One user's membership in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMember {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    /// Set while this member is driving an open study session.
    pub current_session_id: Option<SessionId>,
}

/// Membership operations for study rooms.
#[derive(Clone)]
pub struct RoomDirectory {
    db: Database,
}

impl RoomDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a room; the creator joins automatically.
    pub fn create(&self, name: &str, created_by: &str) -> Result<Room> {
        let now = Utc::now();
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
        };
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO rooms (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![room.id, room.name, room.created_by, room.created_at],
        )
        .map_err(StorageError::from)?;
        conn.execute(
            "INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![room.id, created_by, now],
        )
        .map_err(StorageError::from)?;
        Ok(room)
    }

    pub fn get(&self, room_id: &str) -> Result<Option<Room>> {
        let conn = self.db.lock();
        let room = conn
            .query_row(
                "SELECT id, name, created_by, created_at FROM rooms WHERE id = ?1",
                params![room_id],
                |row| {
                    Ok(Room {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_by: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(room)
    }

    /// Join a room. Joining twice is a no-op.
    pub fn join(&self, room_id: &str, user_id: &str) -> Result<()> {
        let conn = self.db.lock();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM rooms WHERE id = ?1)",
                params![room_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        if !exists {
            return Err(CoreError::Custom(format!("no such room: {room_id}")));
        }
        conn.execute(
            "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![room_id, user_id, Utc::now()],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn leave(&self, room_id: &str, user_id: &str) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.db.lock();
        is_member_tx(&conn, room_id, user_id)
    }

    /// All members of a room, in join order.
    pub fn members(&self, room_id: &str) -> Result<Vec<RoomMember>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT room_id, user_id, joined_at, current_session_id
                 FROM room_members WHERE room_id = ?1 ORDER BY joined_at",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![room_id], row_to_member)
            .map_err(StorageError::from)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row.map_err(StorageError::from)?);
        }
        Ok(members)
    }

    /// Members currently driving an open study session.
    pub fn studying_now(&self, room_id: &str) -> Result<Vec<RoomMember>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT room_id, user_id, joined_at, current_session_id
                 FROM room_members
                 WHERE room_id = ?1 AND current_session_id IS NOT NULL
                 ORDER BY joined_at",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![room_id], row_to_member)
            .map_err(StorageError::from)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row.map_err(StorageError::from)?);
        }
        Ok(members)
    }
}

pub(crate) fn is_member_tx(conn: &Connection, room_id: &str, user_id: &str) -> Result<bool> {
    let member: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2)",
            params![room_id, user_id],
            |row| row.get(0),
        )
        .map_err(StorageError::from)?;
    Ok(member)
}

/// Point a member row at the session it is driving (or clear it).
pub(crate) fn mark_studying_tx(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
    session_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE room_members SET current_session_id = ?3
         WHERE room_id = ?1 AND user_id = ?2",
        params![room_id, user_id, session_id],
    )
    .map_err(StorageError::from)?;
    Ok(())
}

/// Clear the studying marker of whichever member drives `session_id`.
pub(crate) fn clear_session_marker_tx(
    conn: &Connection,
    room_id: &str,
    session_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE room_members SET current_session_id = NULL
         WHERE room_id = ?1 AND current_session_id = ?2",
        params![room_id, session_id],
    )
    .map_err(StorageError::from)?;
    Ok(())
}

/// Clear every studying marker in a room (reset path).
pub(crate) fn clear_room_markers_tx(conn: &Connection, room_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE room_members SET current_session_id = NULL WHERE room_id = ?1",
        params![room_id],
    )
    .map_err(StorageError::from)?;
    Ok(())
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoomMember> {
    Ok(RoomMember {
        room_id: row.get(0)?,
        user_id: row.get(1)?,
        joined_at: row.get(2)?,
        current_session_id: row.get(3)?,
    })
}
