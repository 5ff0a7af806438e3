pub mod chat;
pub mod errors;
pub mod events;
pub mod ids;
pub mod player;
pub mod provider;

pub use chat::{ChatMessage, ChatRole, ChatTurn};
pub use errors::RelayError;
pub use events::PresenceEvent;
pub use ids::{TurnId, UserId};
pub use player::{PlayerState, Pose, Rotation, Vec3};
pub use provider::{CompletionProvider, TranscriptionProvider};
