use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use verse_core::events::PresenceEvent;
use verse_core::ids::UserId;
use verse_core::player::{PlayerState, Pose};

/// The ephemeral state store: one live record per connected user.
///
/// Every mutation emits a diff on the broadcast channel; subscribers
/// that lag simply drop diffs, writers are never blocked. Each user
/// only ever writes their own key, so upserts need no cross-user
/// coordination; concurrent upserts for one user are last-write-wins.
pub struct PresenceStore {
    players: DashMap<UserId, PlayerState>,
    events: broadcast::Sender<PresenceEvent>,
}

impl PresenceStore {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            players: DashMap::new(),
            events,
        }
    }

    /// Replace the full record for `user_id`, stamping the server's
    /// current time. Client-supplied timestamps are never trusted.
    pub fn upsert(&self, user_id: &UserId, pose: Pose) -> PlayerState {
        let state = PlayerState::new(user_id.clone(), pose, Utc::now());

        let event = match self.players.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() = state.clone();
                PresenceEvent::Updated {
                    state: state.clone(),
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(state.clone());
                PresenceEvent::Joined {
                    state: state.clone(),
                }
            }
        };

        let _ = self.events.send(event);
        state
    }

    /// Delete a record (explicit disconnect). No-op if absent.
    pub fn remove(&self, user_id: &UserId) -> bool {
        let removed = self.players.remove(user_id).is_some();
        if removed {
            let _ = self.events.send(PresenceEvent::Left {
                user_id: user_id.clone(),
            });
        }
        removed
    }

    pub fn get(&self, user_id: &UserId) -> Option<PlayerState> {
        self.players.get(user_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of all current records, for broadcast.
    pub fn all(&self) -> Vec<PlayerState> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// Evict every record whose `last_update` is at or before `cutoff`.
    ///
    /// Staleness is re-checked under the map entry at delete time, so a
    /// record refreshed between the scan and the delete is spared.
    pub fn remove_stale(&self, cutoff: DateTime<Utc>) -> usize {
        let candidates: Vec<UserId> = self
            .players
            .iter()
            .filter(|entry| entry.last_update <= cutoff)
            .map(|entry| entry.user_id.clone())
            .collect();

        let mut removed = 0;
        for user_id in candidates {
            if self
                .players
                .remove_if(&user_id, |_, state| state.last_update <= cutoff)
                .is_some()
            {
                removed += 1;
                let _ = self.events.send(PresenceEvent::Left {
                    user_id: user_id.clone(),
                });
                tracing::debug!(user_id = %user_id, "evicted stale player state");
            }
        }
        removed
    }
}

#[cfg(test)]
impl PresenceStore {
    /// Test helper: age a record by `by`.
    pub fn backdate(&self, user_id: &UserId, by: chrono::Duration) {
        if let Some(mut entry) = self.players.get_mut(user_id) {
            entry.last_update -= by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f64) -> Pose {
        Pose {
            position: verse_core::player::Vec3 { x, y: 0.0, z: 0.0 },
            ..Pose::default()
        }
    }

    #[test]
    fn upsert_keeps_one_record_per_user() {
        let store = PresenceStore::new(16);
        let user = UserId::new();

        store.upsert(&user, pose(1.0));
        store.upsert(&user, pose(2.0));
        store.upsert(&user, pose(3.0));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&user).unwrap().position.x, 3.0);
    }

    #[test]
    fn upsert_stamps_server_time() {
        let store = PresenceStore::new(16);
        let user = UserId::new();

        let before = Utc::now();
        let state = store.upsert(&user, pose(1.0));
        let after = Utc::now();

        assert!(state.last_update >= before && state.last_update <= after);
    }

    #[test]
    fn first_upsert_emits_joined_then_updated() {
        let store = PresenceStore::new(16);
        let mut rx = store.subscribe();
        let user = UserId::new();

        store.upsert(&user, pose(1.0));
        store.upsert(&user, pose(2.0));

        assert!(matches!(rx.try_recv().unwrap(), PresenceEvent::Joined { .. }));
        assert!(matches!(rx.try_recv().unwrap(), PresenceEvent::Updated { .. }));
    }

    #[test]
    fn remove_emits_left_once() {
        let store = PresenceStore::new(16);
        let user = UserId::new();
        store.upsert(&user, pose(1.0));

        let mut rx = store.subscribe();
        assert!(store.remove(&user));
        assert!(!store.remove(&user));

        assert!(matches!(rx.try_recv().unwrap(), PresenceEvent::Left { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remove_stale_evicts_old_records() {
        let store = PresenceStore::new(16);
        let fresh = UserId::new();
        let stale = UserId::new();

        store.upsert(&fresh, pose(1.0));
        store.upsert(&stale, pose(2.0));

        // Backdate one record past the cutoff.
        store.players.get_mut(&stale).unwrap().last_update =
            Utc::now() - chrono::Duration::seconds(30);

        let removed = store.remove_stale(Utc::now() - chrono::Duration::seconds(10));
        assert_eq!(removed, 1);
        assert!(store.get(&stale).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn remove_stale_spares_refreshed_record() {
        let store = PresenceStore::new(16);
        let user = UserId::new();
        store.upsert(&user, pose(1.0));

        // Record is fresh, cutoff is in the past: nothing to evict even
        // though the user was present before the cutoff was computed.
        let cutoff = Utc::now() - chrono::Duration::seconds(10);
        assert_eq!(store.remove_stale(cutoff), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_stale_is_idempotent() {
        let store = PresenceStore::new(16);
        let user = UserId::new();
        store.upsert(&user, pose(1.0));
        store.players.get_mut(&user).unwrap().last_update =
            Utc::now() - chrono::Duration::seconds(60);

        let cutoff = Utc::now() - chrono::Duration::seconds(10);
        assert_eq!(store.remove_stale(cutoff), 1);
        assert_eq!(store.remove_stale(cutoff), 0);
    }

    #[test]
    fn all_returns_snapshot() {
        let store = PresenceStore::new(16);
        for _ in 0..3 {
            store.upsert(&UserId::new(), pose(0.0));
        }
        assert_eq!(store.all().len(), 3);
    }

    #[test]
    fn lagged_subscriber_does_not_block_writers() {
        let store = PresenceStore::new(2);
        let _rx = store.subscribe();
        for i in 0..10 {
            store.upsert(&UserId::new(), pose(i as f64));
        }
        assert_eq!(store.len(), 10);
    }
}
