//! SQLite persistence for studyroom.
//!
//! A single shared connection behind a mutex. Every timer transition runs as
//! one `BEGIN IMMEDIATE` transaction on this connection, which is what gives
//! concurrent transitions their at-most-one-winner semantics.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::StorageError;

use super::{data_dir, migrations};

/// Handle to the studyroom SQLite database.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database at `~/.config/studyroom/studyroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()?.join("studyroom.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (tests and ephemeral runs).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        migrations::migrate(&conn)
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the shared connection.
    ///
    /// A poisoned lock is recovered: SQLite state is consistent even if a
    /// panicking thread held the guard, since uncommitted transactions roll
    /// back when dropped.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_migrates() {
        let db = Database::open_memory().unwrap();
        let version: i32 = db
            .lock()
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyroom.db");
        let _db = Database::open_at(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn clones_share_one_connection() {
        let db = Database::open_memory().unwrap();
        let other = db.clone();
        db.lock()
            .execute(
                "INSERT INTO rooms (id, name, created_by, created_at) VALUES ('r', 'n', 'u', 't')",
                [],
            )
            .unwrap();
        let count: i64 = other
            .lock()
            .query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
