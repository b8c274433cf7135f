//! Per-device timer controller.
//!
//! Mirrors the last-known persisted state for one room and exposes a
//! `tokio::sync::watch` channel of display snapshots. The controller owns no
//! durable state: its ticking counter is a disposable cache recomputed from
//! the persisted anchors, and every authoritative delivery replaces whatever
//! the device was showing.
//!
//! Reconciliation has exactly one path: the controller's own transitions are
//! observed through the same subscription as everyone else's. A transition
//! that loses a race (`InvalidTransition`) triggers a re-fetch of the
//! authoritative row instead of a blind retry, so racing `start` calls cannot
//! double-open sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::{Result, SubscriptionError, TimerError};
use crate::identity::IdentityProvider;
use crate::{RoomId, UserId};

use super::clock;
use super::state::{TimerAction, TimerPhase, TimerState};
use super::store::TimerStore;

/// What a device should render right now.
#[derive(Debug, Clone, Serialize)]
pub struct DisplaySnapshot {
    pub phase: TimerPhase,
    pub elapsed_secs: i64,
    pub started_by: Option<UserId>,
    pub version: i64,
    /// True while the realtime feed is lost or lagged; the counter keeps
    /// ticking optimistically but must not be trusted until a resync.
    pub stale: bool,
}

struct ControllerInner {
    state: TimerState,
    stale: bool,
}

impl ControllerInner {
    fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            phase: self.state.phase(),
            elapsed_secs: clock::elapsed_secs(&self.state, Utc::now()),
            started_by: self.state.started_by.clone(),
            version: self.state.version,
            stale: self.stale,
        }
    }
}

/// Per-device controller for one room's timer.
pub struct RoomTimerController {
    store: TimerStore,
    identity: Arc<dyn IdentityProvider>,
    room_id: RoomId,
    inner: Arc<Mutex<ControllerInner>>,
    display_tx: watch::Sender<DisplaySnapshot>,
    shutdown_tx: watch::Sender<bool>,
    listener: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl RoomTimerController {
    /// Attach to a room: verify membership, subscribe, fetch the
    /// authoritative row, then spawn the listener and the display ticker.
    ///
    /// Subscribing before the fetch means a transition committed in between
    /// is delivered rather than missed; stale deliveries are dropped by
    /// version.
    pub async fn attach(
        store: TimerStore,
        identity: Arc<dyn IdentityProvider>,
        room_id: impl Into<RoomId>,
        tick_interval: Duration,
    ) -> Result<Self> {
        let room_id: RoomId = room_id.into();
        let user = identity
            .current_user()
            .ok_or(TimerError::Unauthenticated)?;
        if !store.is_member(&room_id, &user)? {
            return Err(TimerError::NotRoomMember {
                room: room_id,
                user,
            }
            .into());
        }

        let mut subscription = store.notifier().subscribe(&room_id);
        let state = store.get_state(&room_id)?;

        let inner = Arc::new(Mutex::new(ControllerInner {
            state,
            stale: false,
        }));
        let (display_tx, _) = watch::channel(inner.lock().await.snapshot());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let listener = {
            let inner = Arc::clone(&inner);
            let display_tx = display_tx.clone();
            let store = store.clone();
            let room_id = room_id.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        delivery = subscription.recv() => match delivery {
                            Ok(state) => {
                                apply_delivery(&inner, &display_tx, state).await;
                            }
                            Err(SubscriptionError::Lagged(missed)) => {
                                log::warn!(
                                    "room {room_id}: subscription lagged by {missed}, re-fetching"
                                );
                                mark_stale(&inner, &display_tx).await;
                                if let Ok(state) = store.get_state(&room_id) {
                                    force_state(&inner, &display_tx, state).await;
                                }
                            }
                            Err(SubscriptionError::Closed) => {
                                mark_stale(&inner, &display_tx).await;
                                break;
                            }
                        },
                    }
                }
                subscription.unsubscribe();
            })
        };

        let ticker = {
            let inner = Arc::clone(&inner);
            let display_tx = display_tx.clone();
            tokio::spawn(async move {
                let mut interval = time::interval(tick_interval);
                interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    let guard = inner.lock().await;
                    if guard.state.is_running {
                        // Cosmetic: recomputed from anchors, never incremented.
                        let _ = display_tx.send(guard.snapshot());
                    }
                }
            })
        };

        Ok(Self {
            store,
            identity,
            room_id,
            inner,
            display_tx,
            shutdown_tx,
            listener: Some(listener),
            ticker: Some(ticker),
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Watch channel of display snapshots for the UI.
    pub fn display(&self) -> watch::Receiver<DisplaySnapshot> {
        self.display_tx.subscribe()
    }

    pub async fn start(&self) -> Result<TimerState> {
        self.transition(TimerAction::Start).await
    }

    pub async fn pause(&self) -> Result<TimerState> {
        self.transition(TimerAction::Pause).await
    }

    pub async fn resume(&self) -> Result<TimerState> {
        self.transition(TimerAction::Resume).await
    }

    pub async fn reset(&self) -> Result<TimerState> {
        self.transition(TimerAction::Reset).await
    }

    async fn transition(&self, action: TimerAction) -> Result<TimerState> {
        let user = self
            .identity
            .current_user()
            .ok_or(TimerError::Unauthenticated)?;
        let result = match action {
            TimerAction::Start => self.store.start(&self.room_id, &user),
            TimerAction::Pause => self.store.pause(&self.room_id, &user),
            TimerAction::Resume => self.store.resume(&self.room_id, &user),
            TimerAction::Reset => self.store.reset(&self.room_id, &user),
        };
        match result {
            Ok(state) => Ok(state),
            Err(e) if e.is_transition_conflict() => {
                // Another member changed the timer first. Reconcile to the
                // authoritative row; the error stays non-fatal for the UI.
                log::info!("room {}: {action} lost a race, reconciling", self.room_id);
                let _ = self.resync().await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Force a re-fetch of the authoritative row, clearing staleness.
    ///
    /// Used on reconnect/foreground and after lost transition races.
    pub async fn resync(&self) -> Result<TimerState> {
        let state = self.store.get_state(&self.room_id)?;
        force_state(&self.inner, &self.display_tx, state.clone()).await;
        Ok(state)
    }

    /// The last applied authoritative state.
    pub async fn current_state(&self) -> TimerState {
        self.inner.lock().await.state.clone()
    }

    /// Unsubscribe and stop the listener and ticker tasks.
    pub async fn detach(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for RoomTimerController {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Apply an authoritative delivery. Duplicates and stale deliveries
/// (version at or below the one already applied) are dropped, which makes
/// the controller idempotent to at-least-once delivery.
async fn apply_delivery(
    inner: &Arc<Mutex<ControllerInner>>,
    display_tx: &watch::Sender<DisplaySnapshot>,
    state: TimerState,
) {
    let mut guard = inner.lock().await;
    if state.version <= guard.state.version {
        return;
    }
    guard.state = state;
    guard.stale = false;
    let _ = display_tx.send(guard.snapshot());
}

/// Replace local state from a direct fetch, regardless of version.
async fn force_state(
    inner: &Arc<Mutex<ControllerInner>>,
    display_tx: &watch::Sender<DisplaySnapshot>,
    state: TimerState,
) {
    let mut guard = inner.lock().await;
    if state.version >= guard.state.version {
        guard.state = state;
    }
    guard.stale = false;
    let _ = display_tx.send(guard.snapshot());
}

async fn mark_stale(
    inner: &Arc<Mutex<ControllerInner>>,
    display_tx: &watch::Sender<DisplaySnapshot>,
) {
    let mut guard = inner.lock().await;
    guard.stale = true;
    let _ = display_tx.send(guard.snapshot());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FixedIdentity;
    use crate::notifier::ChangeNotifier;
    use crate::room::RoomDirectory;
    use crate::storage::Database;

    fn fixture() -> (Database, TimerStore, RoomId) {
        let db = Database::open_memory().unwrap();
        let rooms = RoomDirectory::new(db.clone());
        let room = rooms.create("algebra", "alice").unwrap();
        rooms.join(&room.id, "bob").unwrap();
        let store = TimerStore::new(db.clone(), ChangeNotifier::new(16));
        (db, store, room.id)
    }

    async fn attach(store: &TimerStore, room: &str, user: &str) -> RoomTimerController {
        RoomTimerController::attach(
            store.clone(),
            Arc::new(FixedIdentity::new(user)),
            room,
            Duration::from_millis(20),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn attach_requires_identity() {
        let (_db, store, room) = fixture();
        let err = match RoomTimerController::attach(
            store,
            Arc::new(FixedIdentity::anonymous()),
            room,
            Duration::from_secs(1),
        )
        .await
        {
            Err(err) => err,
            Ok(_) => panic!("attach without identity should fail"),
        };
        assert!(matches!(
            err,
            crate::error::CoreError::Timer(TimerError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn attach_requires_membership() {
        let (_db, store, room) = fixture();
        let err = match RoomTimerController::attach(
            store,
            Arc::new(FixedIdentity::new("mallory")),
            room,
            Duration::from_secs(1),
        )
        .await
        {
            Err(err) => err,
            Ok(_) => panic!("attach as non-member should fail"),
        };
        assert!(matches!(
            err,
            crate::error::CoreError::Timer(TimerError::NotRoomMember { .. })
        ));
    }

    #[tokio::test]
    async fn own_transition_arrives_through_the_subscription() {
        let (_db, store, room) = fixture();
        let controller = attach(&store, &room, "alice").await;
        let mut display = controller.display();
        assert_eq!(display.borrow().phase, TimerPhase::Idle);

        controller.start().await.unwrap();
        // The authoritative echo flips the display to running.
        time::timeout(Duration::from_secs(1), async {
            loop {
                display.changed().await.unwrap();
                if display.borrow().phase == TimerPhase::Running {
                    break;
                }
            }
        })
        .await
        .unwrap();
        let snap = display.borrow().clone();
        assert_eq!(snap.started_by.as_deref(), Some("alice"));
        assert!(!snap.stale);
        controller.detach().await;
    }

    #[tokio::test]
    async fn other_members_observe_transitions() {
        let (_db, store, room) = fixture();
        let alice = attach(&store, &room, "alice").await;
        let bob = attach(&store, &room, "bob").await;
        let mut bob_display = bob.display();

        alice.start().await.unwrap();
        time::timeout(Duration::from_secs(1), async {
            loop {
                bob_display.changed().await.unwrap();
                if bob_display.borrow().phase == TimerPhase::Running {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(bob_display.borrow().started_by.as_deref(), Some("alice"));

        alice.detach().await;
        bob.detach().await;
    }

    #[tokio::test]
    async fn lost_race_reconciles_instead_of_retrying() {
        let (_db, store, room) = fixture();
        let alice = attach(&store, &room, "alice").await;
        let bob = attach(&store, &room, "bob").await;

        alice.start().await.unwrap();
        let err = bob.start().await.unwrap_err();
        assert!(err.is_transition_conflict());
        // Bob's controller reconciled to the authoritative running state.
        assert_eq!(bob.current_state().await.phase(), TimerPhase::Running);
        assert_eq!(
            bob.current_state().await.started_by.as_deref(),
            Some("alice")
        );

        alice.detach().await;
        bob.detach().await;
    }

    #[tokio::test]
    async fn ticker_advances_display_while_running() {
        let (_db, store, room) = fixture();
        let controller = attach(&store, &room, "alice").await;
        let mut display = controller.display();

        controller.start().await.unwrap();
        // Two ticks apart the version stays put; the snapshot keeps being
        // recomputed from the same anchors.
        let mut seen = 0;
        time::timeout(Duration::from_secs(2), async {
            while seen < 3 {
                display.changed().await.unwrap();
                seen += 1;
            }
        })
        .await
        .unwrap();
        assert_eq!(display.borrow().phase, TimerPhase::Running);
        controller.detach().await;
    }

    #[tokio::test]
    async fn resync_clears_staleness_and_picks_up_external_commits() {
        let (db, store, room) = fixture();
        let controller = attach(&store, &room, "bob").await;
        // A commit made through a store with its own notifier, sharing only
        // the database, like another process writing the same file would.
        let other = TimerStore::new(db, ChangeNotifier::new(16));
        other.start(&room, "alice").unwrap();

        let state = controller.resync().await.unwrap();
        assert_eq!(state.phase(), TimerPhase::Running);
        assert_eq!(controller.current_state().await.version, state.version);
        controller.detach().await;
    }
}
