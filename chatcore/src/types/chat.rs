use crate::types::message::Message;
use crate::types::user::{User, UserId};
use serde::{Deserialize, Serialize};

pub type ChatId = String;

/// A chat as returned by the `ChatWithoutMessages` fragment, plus whatever
/// messages the query selected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    /// Computed by the server for 1:1 chats (the other member's name).
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub all_time_members: Vec<User>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_messages: u32,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn new(id: impl Into<ChatId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.all_time_members.iter().any(|m| m.id == user_id)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &UserId> {
        self.all_time_members.iter().map(|m| &m.id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// True for a 1:1 chat between exactly these two users.
    pub fn is_direct_between(&self, me: &str, other: &str) -> bool {
        !self.is_group && self.has_member(me) && self.has_member(other)
    }
}
