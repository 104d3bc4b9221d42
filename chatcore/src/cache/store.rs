//! Normalized entity store backing the three query results the client keeps:
//! the chat list, single-chat details and the user list.
//!
//! Entities are stored once, keyed by identity (`User` and `Chat` by id,
//! `Message` by [`MessageKey`]). Query roots only hold references, so an
//! update to an entity is visible from every root that mentions it.

use crate::types::{
    Chat, ChatId, ChatRef, Message, MessageId, MessageKey, MessageType, Recipient, User, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChatEntity {
    name: Option<String>,
    picture: Option<String>,
    members: Vec<UserId>,
    is_group: bool,
    unread_messages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecipientEntity {
    user: UserId,
    received_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MessageEntity {
    sender: UserId,
    content: String,
    created_at: DateTime<Utc>,
    message_type: MessageType,
    ownership: bool,
    recipients: Vec<RecipientEntity>,
}

/// Result of `GetChats(amount)`: chat order plus the per-chat message window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ChatListRoot {
    /// Maximum messages kept per chat entry; `None` keeps everything.
    pub(crate) amount: Option<usize>,
    pub(crate) entries: Vec<ChatId>,
    pub(crate) snapshots: HashMap<ChatId, Vec<MessageKey>>,
}

impl ChatListRoot {
    pub(crate) fn trim(&self, keys: &mut Vec<MessageKey>) -> Vec<MessageKey> {
        match self.amount {
            Some(amount) if keys.len() > amount => {
                let excess = keys.len() - amount;
                keys.drain(..excess).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedCache {
    users: HashMap<UserId, User>,
    chats: HashMap<ChatId, ChatEntity>,
    messages: HashMap<MessageKey, MessageEntity>,
    pub(crate) chat_list: Option<ChatListRoot>,
    pub(crate) chat_details: HashMap<ChatId, Vec<MessageKey>>,
    pub(crate) user_list: Option<Vec<UserId>>,
}

/// Appends `key` unless it is already present. Returns whether it was added.
pub(crate) fn push_unique(keys: &mut Vec<MessageKey>, key: MessageKey) -> bool {
    if keys.contains(&key) {
        false
    } else {
        keys.push(key);
        true
    }
}

impl NormalizedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_user(&mut self, user: &User) {
        self.users.insert(user.id.clone(), user.clone());
    }

    pub(crate) fn put_chat(&mut self, chat: &Chat) {
        for member in &chat.all_time_members {
            self.put_user(member);
        }
        self.chats.insert(
            chat.id.clone(),
            ChatEntity {
                name: chat.name.clone(),
                picture: chat.picture.clone(),
                members: chat.member_ids().cloned().collect(),
                is_group: chat.is_group,
                unread_messages: chat.unread_messages,
            },
        );
    }

    pub(crate) fn put_message(&mut self, message: &Message) -> MessageKey {
        self.put_user(&message.sender);
        for recipient in &message.recipients {
            self.put_user(&recipient.user);
        }
        let key = message.key();
        self.messages.insert(
            key.clone(),
            MessageEntity {
                sender: message.sender.id.clone(),
                content: message.content.clone(),
                created_at: message.created_at,
                message_type: message.message_type,
                ownership: message.ownership,
                recipients: message
                    .recipients
                    .iter()
                    .map(|r| RecipientEntity {
                        user: r.user.id.clone(),
                        received_at: r.received_at,
                        read_at: r.read_at,
                    })
                    .collect(),
            },
        );
        key
    }

    /// Stores messages and returns their keys in order, without duplicates.
    pub(crate) fn put_messages(&mut self, messages: &[Message]) -> Vec<MessageKey> {
        let mut keys = Vec::with_capacity(messages.len());
        for message in messages {
            let key = self.put_message(message);
            push_unique(&mut keys, key);
        }
        keys
    }

    pub(crate) fn has_chat(&self, chat_id: &str) -> bool {
        self.chats.contains_key(chat_id)
    }

    pub(crate) fn forget_chat(&mut self, chat_id: &str) {
        self.chats.remove(chat_id);
    }

    fn is_referenced(&self, key: &MessageKey) -> bool {
        if self
            .chat_details
            .get(&key.chat_id)
            .is_some_and(|keys| keys.contains(key))
        {
            return true;
        }
        self.chat_list.as_ref().is_some_and(|list| {
            list.snapshots
                .get(&key.chat_id)
                .is_some_and(|keys| keys.contains(key))
        })
    }

    /// Drops message entities that no query root points at any more.
    pub(crate) fn evict_unreferenced<'a>(&mut self, keys: impl IntoIterator<Item = &'a MessageKey>) {
        for key in keys {
            if !self.is_referenced(key) {
                self.messages.remove(key);
            }
        }
    }

    pub(crate) fn evict_chat_messages(&mut self, chat_id: &str) {
        self.messages.retain(|key, _| key.chat_id != chat_id);
    }

    // Query writes

    /// Stores a `GetChats(amount)` result, replacing any previous chat list.
    pub fn write_chat_list(&mut self, chats: &[Chat], amount: Option<usize>) {
        let mut root = ChatListRoot {
            amount,
            ..Default::default()
        };
        let mut stale = Vec::new();
        for chat in chats {
            self.put_chat(chat);
            let mut keys = self.put_messages(&chat.messages);
            stale.extend(root.trim(&mut keys));
            if !root.entries.contains(&chat.id) {
                root.entries.push(chat.id.clone());
            }
            root.snapshots.insert(chat.id.clone(), keys);
        }
        if let Some(previous) = self.chat_list.replace(root) {
            stale.extend(previous.snapshots.into_values().flatten());
        }
        self.evict_unreferenced(&stale);
    }

    /// Stores a `GetChat(id)` result.
    pub fn write_chat(&mut self, chat: &Chat) {
        self.put_chat(chat);
        let keys = self.put_messages(&chat.messages);
        let previous = self.chat_details.insert(chat.id.clone(), keys);
        if let Some(previous) = previous {
            self.evict_unreferenced(&previous);
        }
    }

    /// Stores a `GetUsers` result.
    pub fn write_users(&mut self, users: &[User]) {
        let mut ids: Vec<UserId> = Vec::with_capacity(users.len());
        for user in users {
            self.put_user(user);
            if !ids.contains(&user.id) {
                ids.push(user.id.clone());
            }
        }
        self.user_list = Some(ids);
    }

    // Query reads

    fn user(&self, id: &str) -> User {
        self.users.get(id).cloned().unwrap_or_else(|| User::new(id))
    }

    fn message(&self, key: &MessageKey) -> Option<Message> {
        let entity = self.messages.get(key)?;
        Some(Message {
            id: key.message_id.clone(),
            chat: ChatRef {
                id: key.chat_id.clone(),
            },
            sender: self.user(&entity.sender),
            content: entity.content.clone(),
            created_at: entity.created_at,
            message_type: entity.message_type,
            ownership: entity.ownership,
            recipients: entity
                .recipients
                .iter()
                .map(|r| Recipient {
                    user: self.user(&r.user),
                    received_at: r.received_at,
                    read_at: r.read_at,
                })
                .collect(),
        })
    }

    fn chat_with(&self, id: &str, keys: &[MessageKey]) -> Option<Chat> {
        let entity = self.chats.get(id)?;
        Some(Chat {
            id: id.to_string(),
            name: entity.name.clone(),
            picture: entity.picture.clone(),
            all_time_members: entity.members.iter().map(|m| self.user(m)).collect(),
            is_group: entity.is_group,
            unread_messages: entity.unread_messages,
            messages: keys.iter().filter_map(|k| self.message(k)).collect(),
        })
    }

    /// The cached chat list, most recently active first. Each chat carries
    /// its message window, oldest first.
    pub fn read_chat_list(&self) -> Option<Vec<Chat>> {
        let list = self.chat_list.as_ref()?;
        Some(
            list.entries
                .iter()
                .filter_map(|id| {
                    let keys = list.snapshots.get(id).map(Vec::as_slice).unwrap_or(&[]);
                    self.chat_with(id, keys)
                })
                .collect(),
        )
    }

    /// The cached single-chat view with its full message list.
    pub fn read_chat(&self, chat_id: &str) -> Option<Chat> {
        let keys = self.chat_details.get(chat_id)?;
        self.chat_with(chat_id, keys)
    }

    pub fn read_users(&self) -> Option<Vec<User>> {
        self.user_list
            .as_ref()
            .map(|ids| ids.iter().map(|id| self.user(id)).collect())
    }

    pub fn has_chat_list(&self) -> bool {
        self.chat_list.is_some()
    }

    pub fn has_chat_detail(&self, chat_id: &str) -> bool {
        self.chat_details.contains_key(chat_id)
    }

    pub fn has_user_list(&self) -> bool {
        self.user_list.is_some()
    }

    /// Ids of chats with a cached detail view.
    pub fn detail_ids(&self) -> impl Iterator<Item = &ChatId> {
        self.chat_details.keys()
    }

    /// Message ids of a chat's detail view, in order.
    pub fn detail_message_ids(&self, chat_id: &str) -> Option<Vec<MessageId>> {
        self.chat_details
            .get(chat_id)
            .map(|keys| keys.iter().map(|k| k.message_id.clone()).collect())
    }

    /// Finds a cached non-group chat whose members include both users.
    pub fn find_direct_chat(&self, me: &str, other: &str) -> Option<ChatId> {
        let list = self.chat_list.as_ref()?;
        list.entries
            .iter()
            .find(|id| {
                self.chats.get(id.as_str()).is_some_and(|chat| {
                    !chat.is_group
                        && chat.members.iter().any(|m| m == me)
                        && chat.members.iter().any(|m| m == other)
                })
            })
            .cloned()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn referenced_keys(&self) -> HashSet<MessageKey> {
        let mut keys: HashSet<MessageKey> = self.chat_details.values().flatten().cloned().collect();
        if let Some(list) = &self.chat_list {
            keys.extend(list.snapshots.values().flatten().cloned());
        }
        keys
    }
}
