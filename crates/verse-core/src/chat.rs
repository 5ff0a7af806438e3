use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TurnId, UserId};

/// Role of a message in a completion-API conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message on the completion-API wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One message/response pair in a user's conversation history.
///
/// Append-only: turns are never mutated after insert, and the timestamp
/// is server-assigned, non-decreasing per user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: TurnId,
    pub user_id: UserId,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Flatten into the user/assistant wire pair, oldest-role first.
    pub fn to_messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage::user(&self.message),
            ChatMessage::assistant(&self.response),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(serde_json::to_string(&ChatRole::System).unwrap(), "\"system\"");
    }

    #[test]
    fn message_wire_shape() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn turn_flattens_to_pair() {
        let turn = ChatTurn {
            id: TurnId::new(),
            user_id: UserId::new(),
            message: "hi".into(),
            response: "hey there".into(),
            timestamp: Utc::now(),
        };
        let [user, assistant] = turn.to_messages();
        assert_eq!(user.role, ChatRole::User);
        assert_eq!(user.content, "hi");
        assert_eq!(assistant.role, ChatRole::Assistant);
        assert_eq!(assistant.content, "hey there");
    }
}
