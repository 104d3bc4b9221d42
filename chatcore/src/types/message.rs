use crate::types::chat::ChatId;
use crate::types::timestamp;
use crate::types::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type MessageId = String;

/// Cache identity of a message. Message ids are only unique within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageKey {
    pub fn new(chat_id: impl Into<ChatId>, message_id: impl Into<MessageId>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message:{}:{}", self.chat_id, self.message_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    Location,
    Picture,
}

/// Back-reference from a message to its chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user: User,
    #[serde(default, with = "timestamp::option")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat: ChatRef,
    pub sender: User,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Computed by the server: whether the current user sent this message.
    #[serde(default)]
    pub ownership: bool,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl Message {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.chat.id.clone(), self.id.clone())
    }

    pub fn chat_id(&self) -> &str {
        &self.chat.id
    }

    /// Builds a text message authored by `sender`, used for provisional
    /// entries before the server has confirmed a send.
    pub fn provisional(
        id: impl Into<MessageId>,
        chat_id: impl Into<ChatId>,
        sender: User,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            chat: ChatRef { id: chat_id.into() },
            sender,
            content: content.into(),
            created_at: Utc::now(),
            message_type: MessageType::Text,
            ownership: true,
            recipients: Vec::new(),
        }
    }

    pub fn is_read_by_all(&self) -> bool {
        !self.recipients.is_empty() && self.recipients.iter().all(|r| r.read_at.is_some())
    }
}
