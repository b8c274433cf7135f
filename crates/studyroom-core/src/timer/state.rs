//! Persisted timer state for a room.
//!
//! One row per room. "Running" is declarative: a start instant plus a flag,
//! so elapsed time can be computed on demand on any device at any time. No
//! background process drives the timer.
//!
//! ## Shapes
//!
//! Exactly one of three shapes holds at any time:
//!
//! ```text
//! Running: is_running, start_time set,  pause_time unset
//! Paused:  !is_running, start_time set, pause_time set
//! Idle:    !is_running, no timestamps, no paused debt, no session
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomId, SessionId, UserId};

/// Local view of a room timer, derived from the persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerPhase::Idle => write!(f, "idle"),
            TimerPhase::Running => write!(f, "running"),
            TimerPhase::Paused => write!(f, "paused"),
        }
    }
}

/// A transition applied to a room timer. Recorded verbatim in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Start,
    Pause,
    Resume,
    Reset,
}

impl TimerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerAction::Start => "start",
            TimerAction::Pause => "pause",
            TimerAction::Resume => "resume",
            TimerAction::Reset => "reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(TimerAction::Start),
            "pause" => Some(TimerAction::Pause),
            "resume" => Some(TimerAction::Resume),
            "reset" => Some(TimerAction::Reset),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authoritative timer row for one room.
///
/// Mutated only through validated [`TimerStore`](super::TimerStore)
/// transitions; everything a client displays is derived from this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub room_id: RoomId,
    pub is_running: bool,
    /// Wall-clock instant the current logical interval began.
    pub start_time: Option<DateTime<Utc>>,
    /// Wall-clock instant the timer was last paused.
    pub pause_time: Option<DateTime<Utc>>,
    /// Cumulative paused time in milliseconds. Non-decreasing until reset.
    pub total_paused_ms: i64,
    pub current_session_id: Option<SessionId>,
    pub started_by: Option<UserId>,
    /// Increments on every committed transition; subscribers drop deliveries
    /// at or below the version they have already applied.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TimerState {
    /// The fully-reset row for a room that has no timer activity.
    pub fn reset_shape(room_id: impl Into<RoomId>, at: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.into(),
            is_running: false,
            start_time: None,
            pause_time: None,
            total_paused_ms: 0,
            current_session_id: None,
            started_by: None,
            version: 0,
            updated_at: at,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        if self.is_running {
            TimerPhase::Running
        } else if self.pause_time.is_some() {
            TimerPhase::Paused
        } else {
            TimerPhase::Idle
        }
    }

    /// Whether the row matches exactly one of the three legal shapes.
    pub fn is_valid_shape(&self) -> bool {
        match (self.is_running, self.start_time, self.pause_time) {
            (true, Some(_), None) => true,
            (false, Some(_), Some(_)) => true,
            (false, None, None) => {
                self.total_paused_ms == 0 && self.current_session_id.is_none()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(now: DateTime<Utc>) -> TimerState {
        TimerState {
            is_running: true,
            start_time: Some(now),
            current_session_id: Some("s1".into()),
            started_by: Some("alice".into()),
            version: 1,
            ..TimerState::reset_shape("r1", now)
        }
    }

    #[test]
    fn reset_shape_is_idle_and_valid() {
        let s = TimerState::reset_shape("r1", Utc::now());
        assert_eq!(s.phase(), TimerPhase::Idle);
        assert!(s.is_valid_shape());
    }

    #[test]
    fn running_shape_is_valid() {
        let s = running(Utc::now());
        assert_eq!(s.phase(), TimerPhase::Running);
        assert!(s.is_valid_shape());
    }

    #[test]
    fn running_with_pause_time_is_invalid() {
        let now = Utc::now();
        let mut s = running(now);
        s.pause_time = Some(now);
        assert!(!s.is_valid_shape());
    }

    #[test]
    fn idle_with_leftover_session_is_invalid() {
        let mut s = TimerState::reset_shape("r1", Utc::now());
        s.current_session_id = Some("s1".into());
        assert!(!s.is_valid_shape());
    }

    #[test]
    fn action_round_trips_through_str() {
        for action in [
            TimerAction::Start,
            TimerAction::Pause,
            TimerAction::Resume,
            TimerAction::Reset,
        ] {
            assert_eq!(TimerAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(TimerAction::parse("skip"), None);
    }
}
