//! Timer state store: validated transitions against the per-room timer row.
//!
//! Each transition is one `BEGIN IMMEDIATE` transaction combining the
//! precondition update of the timer row, the session-ledger write and the
//! event-log append. The update is conditioned on the expected shape (e.g.
//! `... WHERE is_running = 0`); zero affected rows means another member's
//! transition won the race, the transaction rolls back and the caller gets
//! `InvalidTransition`. At most one winner per room per transition, and a
//! losing `start` cannot leak a session row.
//!
//! Committed states are published through the [`ChangeNotifier`] before the
//! connection lock is released, so every subscribed device observes
//! transitions in commit order.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{Result, StorageError, TimerError};
use crate::notifier::ChangeNotifier;
use crate::storage::Database;
use crate::{event_log, ledger, room};

use super::clock;
use super::state::{TimerAction, TimerState};

/// Validated transitions for room timers.
///
/// Cheap to clone; clones share the database connection and the notifier.
#[derive(Clone)]
pub struct TimerStore {
    db: Database,
    notifier: ChangeNotifier,
    read_retry_backoff: std::time::Duration,
}

impl TimerStore {
    pub fn new(db: Database, notifier: ChangeNotifier) -> Self {
        Self {
            db,
            notifier,
            read_retry_backoff: std::time::Duration::from_millis(200),
        }
    }

    pub fn with_read_retry_backoff(mut self, backoff: std::time::Duration) -> Self {
        self.read_retry_backoff = backoff;
        self
    }

    /// The notifier this store publishes committed states through.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.db.lock();
        room::is_member_tx(&conn, room_id, user_id)
    }

    /// Start the room timer and open a fresh study session for `user_id`.
    ///
    /// Fails with `InvalidTransition` if the timer is already running.
    pub fn start(&self, room_id: &str, user_id: &str) -> Result<TimerState> {
        self.start_at(room_id, user_id, Utc::now())
    }

    pub fn start_at(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimerState> {
        let state = {
            let mut conn = self.db.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StorageError::from)?;

            require_member(&tx, room_id, user_id)?;
            ensure_row(&tx, room_id, now)?;

            let session_id = ledger::open_tx(&tx, user_id, 0, now)?;
            let changed = tx
                .execute(
                    "UPDATE timer_state
                     SET is_running = 1, start_time = ?2, pause_time = NULL,
                         total_paused_ms = 0, current_session_id = ?3, started_by = ?4,
                         version = version + 1, updated_at = ?2
                     WHERE room_id = ?1 AND is_running = 0",
                    params![room_id, now, session_id, user_id],
                )
                .map_err(StorageError::from)?;
            if changed == 0 {
                // Rolls back the session insert with the transaction.
                return Err(invalid_transition(&tx, room_id, TimerAction::Start));
            }

            room::mark_studying_tx(&tx, room_id, user_id, Some(&session_id))?;
            event_log::record_tx(&tx, room_id, user_id, TimerAction::Start, now, None)?;

            let state = read_committed(&tx, room_id)?;
            tx.commit().map_err(StorageError::from)?;
            // Still holding the connection lock: a racing transition cannot
            // commit until this publish lands, so deliveries follow commit
            // order.
            self.notifier.publish(&state);
            state
        };

        log::info!("room {room_id}: {user_id} started the timer");
        Ok(state)
    }

    /// Pause the room timer, closing the active session with the elapsed
    /// duration.
    ///
    /// Fails with `InvalidTransition` if the timer is not running.
    pub fn pause(&self, room_id: &str, user_id: &str) -> Result<TimerState> {
        self.pause_at(room_id, user_id, Utc::now())
    }

    pub fn pause_at(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimerState> {
        let (state, elapsed) = {
            let mut conn = self.db.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StorageError::from)?;

            require_member(&tx, room_id, user_id)?;
            let Some(current) = read_state(&tx, room_id)? else {
                return Err(invalid_transition(&tx, room_id, TimerAction::Pause));
            };

            let elapsed = clock::elapsed_secs(&current, now);
            let changed = tx
                .execute(
                    "UPDATE timer_state
                     SET is_running = 0, pause_time = ?2,
                         version = version + 1, updated_at = ?2
                     WHERE room_id = ?1 AND is_running = 1",
                    params![room_id, now],
                )
                .map_err(StorageError::from)?;
            if changed == 0 {
                return Err(invalid_transition(&tx, room_id, TimerAction::Pause));
            }

            if let Some(session_id) = current.current_session_id.as_deref() {
                ledger::close_tx(&tx, session_id, elapsed, now)?;
                room::clear_session_marker_tx(&tx, room_id, session_id)?;
            }
            event_log::record_tx(&tx, room_id, user_id, TimerAction::Pause, now, Some(elapsed))?;

            let state = read_committed(&tx, room_id)?;
            tx.commit().map_err(StorageError::from)?;
            self.notifier.publish(&state);
            (state, elapsed)
        };

        log::info!("room {room_id}: {user_id} paused the timer at {elapsed}s");
        Ok(state)
    }

    /// Resume a paused timer.
    ///
    /// Opens a new study session for `user_id` seeded with the elapsed time
    /// carried forward, and accumulates the pause gap into the paused debt so
    /// the elapsed formula keeps yielding the cumulative duration.
    ///
    /// Fails with `InvalidTransition` unless the timer is paused.
    pub fn resume(&self, room_id: &str, user_id: &str) -> Result<TimerState> {
        self.resume_at(room_id, user_id, Utc::now())
    }

    pub fn resume_at(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimerState> {
        let state = {
            let mut conn = self.db.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StorageError::from)?;

            require_member(&tx, room_id, user_id)?;
            let Some(current) = read_state(&tx, room_id)? else {
                return Err(invalid_transition(&tx, room_id, TimerAction::Resume));
            };
            let Some(pause_time) = current.pause_time.filter(|_| !current.is_running) else {
                return Err(invalid_transition(&tx, room_id, TimerAction::Resume));
            };

            let carried_secs = clock::elapsed_secs(&current, now);
            let pause_gap_ms = (now - pause_time).num_milliseconds().max(0);
            let total_paused_ms = current.total_paused_ms + pause_gap_ms;

            let session_id = ledger::open_tx(&tx, user_id, carried_secs, now)?;
            let changed = tx
                .execute(
                    "UPDATE timer_state
                     SET is_running = 1, pause_time = NULL, total_paused_ms = ?2,
                         current_session_id = ?3,
                         version = version + 1, updated_at = ?4
                     WHERE room_id = ?1 AND is_running = 0 AND pause_time IS NOT NULL",
                    params![room_id, total_paused_ms, session_id, now],
                )
                .map_err(StorageError::from)?;
            if changed == 0 {
                return Err(invalid_transition(&tx, room_id, TimerAction::Resume));
            }

            room::mark_studying_tx(&tx, room_id, user_id, Some(&session_id))?;
            event_log::record_tx(&tx, room_id, user_id, TimerAction::Resume, now, None)?;

            let state = read_committed(&tx, room_id)?;
            tx.commit().map_err(StorageError::from)?;
            self.notifier.publish(&state);
            state
        };

        log::info!("room {room_id}: {user_id} resumed the timer");
        Ok(state)
    }

    /// Unconditionally return the room to the fully-reset shape.
    ///
    /// A still-open active session is closed with the elapsed-at-reset
    /// snapshot; history rows are preserved, never deleted.
    pub fn reset(&self, room_id: &str, user_id: &str) -> Result<TimerState> {
        self.reset_at(room_id, user_id, Utc::now())
    }

    pub fn reset_at(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimerState> {
        let state = {
            let mut conn = self.db.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StorageError::from)?;

            require_member(&tx, room_id, user_id)?;
            ensure_row(&tx, room_id, now)?;
            let current = read_state(&tx, room_id)?
                .unwrap_or_else(|| TimerState::reset_shape(room_id, now));

            let elapsed = clock::elapsed_secs(&current, now);
            if let Some(session_id) = current.current_session_id.as_deref() {
                ledger::close_tx(&tx, session_id, elapsed, now)?;
            }
            room::clear_room_markers_tx(&tx, room_id)?;

            tx.execute(
                "UPDATE timer_state
                 SET is_running = 0, start_time = NULL, pause_time = NULL,
                     total_paused_ms = 0, current_session_id = NULL, started_by = NULL,
                     version = version + 1, updated_at = ?2
                 WHERE room_id = ?1",
                params![room_id, now],
            )
            .map_err(StorageError::from)?;
            event_log::record_tx(&tx, room_id, user_id, TimerAction::Reset, now, Some(elapsed))?;

            let state = read_committed(&tx, room_id)?;
            tx.commit().map_err(StorageError::from)?;
            self.notifier.publish(&state);
            state
        };

        log::info!("room {room_id}: {user_id} reset the timer");
        Ok(state)
    }

    /// Read the current timer row for a room.
    ///
    /// Absent rows read as the fully-reset shape with `version = 0`. The read
    /// is retried once after a short backoff on storage failure; writes are
    /// never blindly retried.
    pub fn get_state(&self, room_id: &str) -> Result<TimerState> {
        self.get_state_at(room_id, Utc::now())
    }

    pub fn get_state_at(&self, room_id: &str, now: DateTime<Utc>) -> Result<TimerState> {
        match self.read_once(room_id, now) {
            Ok(state) => Ok(state),
            Err(first) => {
                log::warn!("room {room_id}: state read failed ({first}), retrying once");
                std::thread::sleep(self.read_retry_backoff);
                self.read_once(room_id, now).map_err(Into::into)
            }
        }
    }

    fn read_once(&self, room_id: &str, now: DateTime<Utc>) -> Result<TimerState, StorageError> {
        let conn = self.db.lock();
        let state = read_state(&conn, room_id)?;
        Ok(state.unwrap_or_else(|| TimerState::reset_shape(room_id, now)))
    }
}

fn require_member(conn: &Connection, room_id: &str, user_id: &str) -> Result<()> {
    if room::is_member_tx(conn, room_id, user_id)? {
        Ok(())
    } else {
        Err(TimerError::NotRoomMember {
            room: room_id.to_string(),
            user: user_id.to_string(),
        }
        .into())
    }
}

/// Make sure the room has a timer row so precondition updates have a target.
fn ensure_row(conn: &Connection, room_id: &str, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO timer_state (room_id, updated_at) VALUES (?1, ?2)",
        params![room_id, now],
    )
    .map_err(StorageError::from)?;
    Ok(())
}

fn invalid_transition(
    conn: &Connection,
    room_id: &str,
    action: TimerAction,
) -> crate::error::CoreError {
    let phase = read_state(conn, room_id)
        .ok()
        .flatten()
        .map(|s| s.phase())
        .unwrap_or(super::state::TimerPhase::Idle);
    TimerError::InvalidTransition { action, phase }.into()
}

fn read_committed(conn: &Connection, room_id: &str) -> Result<TimerState, StorageError> {
    read_state(conn, room_id)?
        .ok_or_else(|| StorageError::QueryFailed(format!("timer row vanished for room {room_id}")))
}

fn read_state(conn: &Connection, room_id: &str) -> Result<Option<TimerState>, StorageError> {
    let state = conn
        .query_row(
            "SELECT room_id, is_running, start_time, pause_time, total_paused_ms,
                    current_session_id, started_by, version, updated_at
             FROM timer_state WHERE room_id = ?1",
            params![room_id],
            |row| {
                Ok(TimerState {
                    room_id: row.get(0)?,
                    is_running: row.get(1)?,
                    start_time: row.get(2)?,
                    pause_time: row.get(3)?,
                    total_paused_ms: row.get(4)?,
                    current_session_id: row.get(5)?,
                    started_by: row.get(6)?,
                    version: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}
