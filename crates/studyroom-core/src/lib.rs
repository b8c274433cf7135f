//! # Studyroom Core Library
//!
//! Core business logic for the Studyroom shared study timer. A room's timer is
//! a single persisted row driven by validated transitions; every member device
//! derives "current elapsed time" from the persisted wall-clock anchors rather
//! than from a locally accumulated counter, so displays stay consistent across
//! devices and survive disconnects.
//!
//! ## Architecture
//!
//! - **Timer store**: atomic start/pause/resume/reset transitions against the
//!   per-room state row, with precondition updates so concurrent transitions
//!   have at most one winner
//! - **Session ledger**: append-only study-session records feeding history and
//!   the leaderboard
//! - **Event log**: append-only audit trail of who did what to a room's timer
//! - **Notifier**: per-room fan-out of committed timer states to subscribers
//! - **Controller**: the per-device component that mirrors the persisted state,
//!   ticks a cosmetic display clock and reconciles on every authoritative update
//!
//! ## Key Components
//!
//! - [`TimerStore`]: validated timer transitions
//! - [`RoomTimerController`]: per-device display state machine
//! - [`SessionLedger`]: study-session history and aggregation
//! - [`Database`]: SQLite persistence
//! - [`StudyroomConfig`]: application configuration

pub mod error;
pub mod event_log;
pub mod identity;
pub mod ledger;
pub mod notifier;
pub mod room;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, LedgerError, StorageError, SubscriptionError, TimerError};
pub use event_log::{EventLog, TimerEvent};
pub use identity::{FixedIdentity, IdentityProvider};
pub use ledger::{SessionLedger, StudySession, UserTotal};
pub use notifier::{ChangeNotifier, RoomSubscription};
pub use room::{Room, RoomDirectory, RoomMember};
pub use storage::{Database, StudyroomConfig};
pub use timer::{
    elapsed, DisplaySnapshot, RoomTimerController, TimerAction, TimerPhase, TimerState, TimerStore,
};

/// Unique identifier for a room.
pub type RoomId = String;

/// Unique identifier for a user.
pub type UserId = String;

/// Unique identifier for a study session.
pub type SessionId = String;
