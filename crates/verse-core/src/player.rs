use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A point in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Avatar look direction: pitch (`x`) and yaw (`y`), radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f64,
    pub y: f64,
}

/// The client-supplied portion of a player state update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Rotation,
    pub position: Vec3,
}

/// One user's live presence record.
///
/// `last_update` is always server-assigned at upsert time; a timestamp
/// supplied by the client is never trusted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerState {
    pub user_id: UserId,
    pub rotation: Rotation,
    pub position: Vec3,
    pub last_update: DateTime<Utc>,
}

impl PlayerState {
    pub fn new(user_id: UserId, pose: Pose, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            rotation: pose.rotation,
            position: pose.position,
            last_update: now,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            rotation: self.rotation,
            position: self.position,
        }
    }

    /// Milliseconds since the last update, as seen from `now`.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_update).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_deserializes_from_wire_shape() {
        let json = r#"{"rotation":{"x":0.1,"y":-1.5},"position":{"x":1.0,"y":2.0,"z":3.0}}"#;
        let pose: Pose = serde_json::from_str(json).unwrap();
        assert_eq!(pose.rotation.y, -1.5);
        assert_eq!(pose.position.z, 3.0);
    }

    #[test]
    fn new_stamps_the_given_time() {
        let now = Utc::now();
        let state = PlayerState::new(UserId::new(), Pose::default(), now);
        assert_eq!(state.last_update, now);
        assert_eq!(state.pose(), Pose::default());
    }

    #[test]
    fn age_grows_with_now() {
        let now = Utc::now();
        let state = PlayerState::new(UserId::new(), Pose::default(), now);
        assert_eq!(state.age_ms(now), 0);
        let later = now + chrono::Duration::milliseconds(1500);
        assert_eq!(state.age_ms(later), 1500);
    }
}
