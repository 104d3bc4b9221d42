//! Display-ready shapes of cached data, and the small pieces of input state
//! the chat screens keep.

use chatcore::types::{Chat, ChatId, Message, MessageId, User, UserId};
use chrono::{DateTime, Local, Utc};

fn time_label(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListItem {
    pub id: ChatId,
    pub title: String,
    pub picture: Option<String>,
    pub last_message: Option<String>,
    pub time: Option<String>,
    pub unread: u32,
}

impl ChatListItem {
    pub fn from_chat(chat: &Chat) -> Self {
        let last = chat.last_message();
        Self {
            id: chat.id.clone(),
            title: chat
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| chat.id.clone()),
            picture: chat.picture.clone(),
            last_message: last.map(|m| m.content.clone()),
            time: last.map(|m| time_label(&m.created_at)),
            unread: chat.unread_messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBubble {
    pub id: MessageId,
    pub content: String,
    /// Shown above other people's messages in groups.
    pub sender: Option<String>,
    pub time: String,
    pub own: bool,
}

impl MessageBubble {
    pub fn from_message(message: &Message, in_group: bool) -> Self {
        Self {
            id: message.id.clone(),
            content: message.content.clone(),
            sender: (in_group && !message.ownership)
                .then(|| message.sender.display_name().to_string()),
            time: time_label(&message.created_at),
            own: message.ownership,
        }
    }
}

/// The message input box.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    text: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Takes the trimmed content for sending. Blank input is kept and
    /// nothing is sent.
    pub fn submit(&mut self) -> Option<String> {
        let content = self.text.trim();
        if content.is_empty() {
            return None;
        }
        let content = content.to_string();
        self.text.clear();
        Some(content)
    }
}

/// Users picked for a new group, in the order they were picked.
#[derive(Debug, Clone, Default)]
pub struct UserSelection {
    selected: Vec<User>,
}

impl UserSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the user, or removes them if already picked. Returns whether the
    /// user is selected afterwards.
    pub fn toggle(&mut self, user: &User) -> bool {
        if let Some(pos) = self.selected.iter().position(|u| u.id == user.id) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(user.clone());
            true
        }
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.selected.iter().any(|u| u.id == user_id)
    }

    pub fn selected(&self) -> &[User] {
        &self.selected
    }

    pub fn ids(&self) -> Vec<UserId> {
        self.selected.iter().map(|u| u.id.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}

pub fn render_chat_list(chats: &[Chat]) -> Vec<String> {
    chats
        .iter()
        .map(ChatListItem::from_chat)
        .map(|item| {
            let mut line = format!("[{}] {}", item.id, item.title);
            if item.unread > 0 {
                line.push_str(&format!(" ({})", item.unread));
            }
            if let (Some(preview), Some(time)) = (item.last_message, item.time) {
                line.push_str(&format!(" | {time} {preview}"));
            }
            line
        })
        .collect()
}

pub fn render_chat(chat: &Chat) -> Vec<String> {
    let mut lines = vec![format!("== {} ==", ChatListItem::from_chat(chat).title)];
    lines.extend(chat.messages.iter().map(|m| {
        let bubble = MessageBubble::from_message(m, chat.is_group);
        let who = match (&bubble.sender, bubble.own) {
            (_, true) => "me".to_string(),
            (Some(sender), false) => sender.clone(),
            (None, false) => "them".to_string(),
        };
        format!("{} [{}] {}: {}", bubble.time, bubble.id, who, bubble.content)
    }));
    lines
}

pub fn render_users(users: &[User]) -> Vec<String> {
    users
        .iter()
        .map(|u| format!("[{}] {}", u.id, u.display_name()))
        .collect()
}
