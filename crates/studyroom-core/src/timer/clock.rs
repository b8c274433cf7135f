//! Clock model: persisted anchors to displayed elapsed time.
//!
//! Pure wall-clock math, no I/O. Every device evaluates the same formula
//! against its own "now", so the displayed duration never depends on a
//! locally accumulated counter. Device clock skew shifts the result by the
//! skew itself, never by accumulated ticking error.

use chrono::{DateTime, Duration, Utc};

use super::state::TimerState;

/// Elapsed study time for `state` observed at `now`.
///
/// `(running ? now : pause_time) - start_time - total_paused`, clamped
/// non-negative. Zero when no interval anchor exists (the reset shape).
pub fn elapsed(state: &TimerState, now: DateTime<Utc>) -> Duration {
    let Some(start) = state.start_time else {
        return Duration::zero();
    };
    let end = if state.is_running {
        now
    } else {
        // Paused: frozen at the pause instant.
        state.pause_time.unwrap_or(now)
    };
    let raw = end - start - Duration::milliseconds(state.total_paused_ms);
    raw.max(Duration::zero())
}

/// Whole elapsed seconds, the granularity persisted to the session ledger.
pub fn elapsed_secs(state: &TimerState, now: DateTime<Utc>) -> i64 {
    elapsed(state, now).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn running_since(start: i64, paused_ms: i64) -> TimerState {
        TimerState {
            is_running: true,
            start_time: Some(at(start)),
            total_paused_ms: paused_ms,
            current_session_id: Some("s1".into()),
            version: 1,
            ..TimerState::reset_shape("r1", at(start))
        }
    }

    fn paused_between(start: i64, pause: i64, paused_ms: i64) -> TimerState {
        TimerState {
            is_running: false,
            start_time: Some(at(start)),
            pause_time: Some(at(pause)),
            total_paused_ms: paused_ms,
            current_session_id: Some("s1".into()),
            version: 2,
            ..TimerState::reset_shape("r1", at(start))
        }
    }

    #[test]
    fn reset_shape_has_zero_elapsed() {
        let s = TimerState::reset_shape("r1", at(0));
        assert_eq!(elapsed(&s, at(100)), Duration::zero());
    }

    #[test]
    fn running_elapsed_tracks_now() {
        let s = running_since(0, 0);
        assert_eq!(elapsed_secs(&s, at(5)), 5);
        assert_eq!(elapsed_secs(&s, at(90)), 90);
    }

    #[test]
    fn paused_debt_is_subtracted() {
        let s = running_since(0, 4_000);
        assert_eq!(elapsed_secs(&s, at(10)), 6);
    }

    #[test]
    fn paused_elapsed_is_frozen_at_pause_instant() {
        let s = paused_between(0, 10, 0);
        assert_eq!(elapsed_secs(&s, at(10)), 10);
        assert_eq!(elapsed_secs(&s, at(500)), 10);
    }

    #[test]
    fn skewed_observer_clamps_to_zero() {
        // Observer clock behind the start anchor.
        let s = running_since(100, 0);
        assert_eq!(elapsed(&s, at(50)), Duration::zero());
    }

    proptest! {
        #[test]
        fn running_elapsed_is_monotone_in_now(
            start in 0i64..10_000,
            a in 0i64..100_000,
            b in 0i64..100_000,
            paused_ms in 0i64..1_000_000,
        ) {
            let s = running_since(start, paused_ms);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(elapsed(&s, at(lo)) <= elapsed(&s, at(hi)));
        }

        #[test]
        fn paused_elapsed_is_constant_in_now(
            start in 0i64..1_000,
            gap in 0i64..10_000,
            paused_ms in 0i64..1_000_000,
            obs in 0i64..100_000,
        ) {
            let s = paused_between(start, start + gap, paused_ms);
            prop_assert_eq!(elapsed(&s, at(obs)), elapsed(&s, at(obs + 1_234)));
        }

        #[test]
        fn elapsed_is_never_negative(
            start in 0i64..10_000,
            now in 0i64..10_000,
            paused_ms in 0i64..100_000_000,
        ) {
            let s = running_since(start, paused_ms);
            prop_assert!(elapsed(&s, at(now)) >= Duration::zero());
        }
    }
}
