//! Core error types for studyroom-core.
//!
//! Domain-specific error enums aggregated into a single [`CoreError`] via
//! `#[from]` conversions. Timer transitions return typed errors so callers
//! can tell a lost race (`InvalidTransition`) from a broken storage layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::{TimerAction, TimerPhase};
use crate::{RoomId, UserId};

/// Top-level error type for studyroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Timer transition errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Session ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Realtime subscription errors
    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    /// True for errors a controller resolves by re-fetching the authoritative
    /// state and reconciling, rather than by retrying the write.
    pub fn is_transition_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::Timer(TimerError::InvalidTransition { .. })
                | CoreError::Ledger(LedgerError::SessionAlreadyOpen(_))
        )
    }
}

/// Timer transition errors.
#[derive(Error, Debug)]
pub enum TimerError {
    /// The requested action is incompatible with the current persisted state,
    /// typically because another member's transition won the race.
    #[error("cannot {action} while timer is {phase}")]
    InvalidTransition {
        action: TimerAction,
        phase: TimerPhase,
    },

    /// No user identity available.
    #[error("not authenticated")]
    Unauthenticated,

    /// The acting user does not belong to the room.
    #[error("user '{user}' is not a member of room '{room}'")]
    NotRoomMember { room: RoomId, user: UserId },
}

/// Session ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The user already has an open session; opening another would
    /// double-count study time.
    #[error("user '{0}' already has an open study session")]
    SessionAlreadyOpen(UserId),

    /// No session with the given id.
    #[error("unknown session '{0}'")]
    UnknownSession(String),
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// IO failure while preparing storage
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Realtime subscription errors.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    /// The subscriber fell behind and missed updates; the current state must
    /// be re-fetched from the store.
    #[error("subscription lagged, {0} updates were dropped")]
    Lagged(u64),

    /// The feed for this room is gone.
    #[error("subscription closed")]
    Closed,
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(StorageError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
