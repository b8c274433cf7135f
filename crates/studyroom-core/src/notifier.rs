//! Realtime change notifier.
//!
//! Per-room fan-out of committed timer states. Each room gets its own
//! broadcast channel, created on first subscribe and pruned once the last
//! subscriber is gone. Subscriptions are explicit handles with an explicit
//! `unsubscribe`, never a process-wide singleton, so navigating between rooms
//! cannot leak listeners.
//!
//! Delivery is in commit order per room and at-least-once from the
//! subscriber's point of view: a slow subscriber sees
//! [`SubscriptionError::Lagged`] and is expected to re-fetch the current
//! state from the store instead of replaying what it missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::error::SubscriptionError;
use crate::timer::TimerState;
use crate::RoomId;

type RoomChannels = Arc<Mutex<HashMap<RoomId, broadcast::Sender<TimerState>>>>;

/// Fan-out hub for committed timer states.
///
/// Cheap to clone; all clones share the same per-room channels.
#[derive(Clone)]
pub struct ChangeNotifier {
    rooms: RoomChannels,
    capacity: usize,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to committed states of one room.
    pub fn subscribe(&self, room_id: &str) -> RoomSubscription {
        let mut rooms = lock(&self.rooms);
        let sender = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        RoomSubscription {
            room_id: room_id.to_string(),
            rx: sender.subscribe(),
            rooms: Arc::clone(&self.rooms),
        }
    }

    /// Publish a committed state to all subscribers of its room.
    ///
    /// Returns the number of subscribers reached. Rooms with no remaining
    /// subscribers are pruned.
    pub fn publish(&self, state: &TimerState) -> usize {
        let mut rooms = lock(&self.rooms);
        let Some(sender) = rooms.get(&state.room_id).cloned() else {
            return 0;
        };
        match sender.send(state.clone()) {
            Ok(reached) => reached,
            Err(_) => {
                rooms.remove(&state.room_id);
                0
            }
        }
    }

    /// Number of active subscribers for a room.
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        lock(&self.rooms)
            .get(room_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

/// A live subscription to one room's committed timer states.
pub struct RoomSubscription {
    room_id: RoomId,
    rx: broadcast::Receiver<TimerState>,
    rooms: RoomChannels,
}

impl RoomSubscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Wait for the next committed state.
    pub async fn recv(&mut self) -> Result<TimerState, SubscriptionError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(missed) => SubscriptionError::Lagged(missed),
            broadcast::error::RecvError::Closed => SubscriptionError::Closed,
        })
    }

    /// Drop the subscription and prune the room channel if this was the last
    /// subscriber.
    pub fn unsubscribe(self) {
        let RoomSubscription { room_id, rx, rooms } = self;
        drop(rx);
        let mut rooms = lock(&rooms);
        let empty = rooms
            .get(&room_id)
            .map(|sender| sender.receiver_count() == 0)
            .unwrap_or(false);
        if empty {
            rooms.remove(&room_id);
        }
    }
}

fn lock(rooms: &RoomChannels) -> std::sync::MutexGuard<'_, HashMap<RoomId, broadcast::Sender<TimerState>>> {
    rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerState;
    use chrono::Utc;

    fn state(room: &str, version: i64) -> TimerState {
        TimerState {
            version,
            ..TimerState::reset_shape(room, Utc::now())
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_states_in_order() {
        let notifier = ChangeNotifier::new(8);
        let mut sub = notifier.subscribe("r1");
        notifier.publish(&state("r1", 1));
        notifier.publish(&state("r1", 2));
        assert_eq!(sub.recv().await.unwrap().version, 1);
        assert_eq!(sub.recv().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let notifier = ChangeNotifier::new(8);
        assert_eq!(notifier.publish(&state("r1", 1)), 0);
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let notifier = ChangeNotifier::new(8);
        let mut sub_a = notifier.subscribe("a");
        let _sub_b = notifier.subscribe("b");
        notifier.publish(&state("b", 7));
        notifier.publish(&state("a", 3));
        assert_eq!(sub_a.recv().await.unwrap().version, 3);
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_lag_error() {
        let notifier = ChangeNotifier::new(2);
        let mut sub = notifier.subscribe("r1");
        for v in 1..=5 {
            notifier.publish(&state("r1", v));
        }
        match sub.recv().await {
            Err(SubscriptionError::Lagged(missed)) => assert!(missed >= 1),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsubscribe_prunes_empty_room() {
        let notifier = ChangeNotifier::new(8);
        let sub = notifier.subscribe("r1");
        assert_eq!(notifier.subscriber_count("r1"), 1);
        sub.unsubscribe();
        assert_eq!(notifier.subscriber_count("r1"), 0);
        assert_eq!(notifier.publish(&state("r1", 1)), 0);
    }
}
