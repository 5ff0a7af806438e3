use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::player::PlayerState;

/// A presence diff, broadcast to subscribers whenever the ephemeral
/// state store changes. Store mutation enqueues one of these; each
/// subscriber drains them independently of store-write latency.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    Joined { state: PlayerState },
    Updated { state: PlayerState },
    Left { user_id: UserId },
}

impl PresenceEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Joined { state } | Self::Updated { state } => &state.user_id,
            Self::Left { user_id } => user_id,
        }
    }
}
