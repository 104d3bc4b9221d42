//! Cache reconciliation.
//!
//! Every local change to cached query results goes through [`CachePatch`] and
//! [`NormalizedCache::apply`], whether it comes from a mutation result, an
//! optimistic layer or a subscription payload. The invariants hold here and
//! nowhere else:
//!
//! - a message id appears at most once per chat, in both the detail view and
//!   the chat-list window;
//! - a chat that receives a message moves to the head of the chat list;
//! - removals touch the detail view and the chat-list window together.

use crate::cache::store::{NormalizedCache, push_unique};
use crate::types::{Chat, ChatId, Message, MessageId, MessageKey, User};
use log::debug;
use std::collections::HashSet;

/// Which messages a removal targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Ids(Vec<MessageId>),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachePatch {
    /// A message was sent or received.
    MessageAdded(Message),
    /// Messages were removed from a chat. `survivors` is the caller's view of
    /// the chat's messages that were kept, used to rebuild the chat-list
    /// window.
    MessagesRemoved {
        chat_id: ChatId,
        removal: Removal,
        survivors: Vec<Message>,
    },
    /// A chat or group was created.
    ChatAdded(Chat),
    /// A chat was deleted.
    ChatRemoved(ChatId),
    /// A user signed up.
    UserAdded(User),
}

impl CachePatch {
    /// Chat whose views this patch touches, if it is scoped to one chat.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            CachePatch::MessageAdded(message) => Some(message.chat_id()),
            CachePatch::MessagesRemoved { chat_id, .. } | CachePatch::ChatRemoved(chat_id) => {
                Some(chat_id)
            }
            CachePatch::ChatAdded(chat) => Some(&chat.id),
            CachePatch::UserAdded(_) => None,
        }
    }
}

impl NormalizedCache {
    pub fn apply(&mut self, patch: &CachePatch) {
        match patch {
            CachePatch::MessageAdded(message) => self.add_message(message),
            CachePatch::MessagesRemoved {
                chat_id,
                removal,
                survivors,
            } => self.remove_messages(chat_id, removal, survivors),
            CachePatch::ChatAdded(chat) => self.add_chat(chat),
            CachePatch::ChatRemoved(chat_id) => self.remove_chat(chat_id),
            CachePatch::UserAdded(user) => self.add_user(user),
        }
    }

    fn add_message(&mut self, message: &Message) {
        let key = self.put_message(message);
        let chat_id = message.chat_id();

        if let Some(detail) = self.chat_details.get_mut(chat_id) {
            push_unique(detail, key.clone());
        }

        let chat_known = self.has_chat(chat_id);
        let mut trimmed = Vec::new();
        if let Some(list) = self.chat_list.as_mut() {
            let known = list.entries.iter().position(|id| id == chat_id);
            match known {
                Some(pos) => {
                    let id = list.entries.remove(pos);
                    list.entries.insert(0, id);
                }
                None if chat_known => {
                    list.entries.insert(0, chat_id.to_string());
                }
                None => {
                    debug!("Message {key} is for a chat missing from the chat list");
                }
            }
            if list.entries.first().is_some_and(|id| id == chat_id) {
                let mut window = list.snapshots.remove(chat_id).unwrap_or_default();
                push_unique(&mut window, key);
                trimmed = list.trim(&mut window);
                list.snapshots.insert(chat_id.to_string(), window);
            }
        }
        self.evict_unreferenced(&trimmed);
    }

    fn remove_messages(&mut self, chat_id: &str, removal: &Removal, survivors: &[Message]) {
        let removed: HashSet<MessageKey> = match removal {
            Removal::All => {
                let mut keys: HashSet<MessageKey> = self
                    .chat_details
                    .get(chat_id)
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect();
                if let Some(list) = &self.chat_list {
                    keys.extend(list.snapshots.get(chat_id).into_iter().flatten().cloned());
                }
                keys.extend(survivors.iter().map(Message::key));
                keys
            }
            Removal::Ids(ids) => ids
                .iter()
                .map(|id| MessageKey::new(chat_id, id.clone()))
                .collect(),
        };

        if let Some(detail) = self.chat_details.get_mut(chat_id) {
            detail.retain(|key| !removed.contains(key));
        }

        let kept: Vec<&Message> = match removal {
            Removal::All => Vec::new(),
            Removal::Ids(_) => survivors
                .iter()
                .filter(|m| m.chat_id() == chat_id && !removed.contains(&m.key()))
                .collect(),
        };
        let mut rebuilt = Vec::with_capacity(kept.len());
        if self
            .chat_list
            .as_ref()
            .is_some_and(|list| list.snapshots.contains_key(chat_id))
        {
            for message in kept {
                let key = self.put_message(message);
                push_unique(&mut rebuilt, key);
            }
        }

        let mut stale: Vec<MessageKey> = removed.iter().cloned().collect();
        if let Some(list) = self.chat_list.as_mut()
            && let Some(mut window) = list.snapshots.remove(chat_id)
        {
            if rebuilt.is_empty() {
                window.retain(|key| !removed.contains(key));
            } else {
                stale.append(&mut window);
                window = rebuilt;
                stale.extend(list.trim(&mut window));
            }
            list.snapshots.insert(chat_id.to_string(), window);
        }
        self.evict_unreferenced(&stale);
    }

    fn add_chat(&mut self, chat: &Chat) {
        self.put_chat(chat);
        let mut keys = self.put_messages(&chat.messages);
        let stale = if let Some(list) = self.chat_list.as_mut()
            && !list.entries.contains(&chat.id)
        {
            let trimmed = list.trim(&mut keys);
            list.entries.push(chat.id.clone());
            list.snapshots.insert(chat.id.clone(), keys);
            trimmed
        } else {
            keys
        };
        self.evict_unreferenced(&stale);
    }

    fn remove_chat(&mut self, chat_id: &str) {
        if let Some(list) = self.chat_list.as_mut() {
            list.entries.retain(|id| id != chat_id);
            list.snapshots.remove(chat_id);
        }
        self.chat_details.remove(chat_id);
        self.evict_chat_messages(chat_id);
        self.forget_chat(chat_id);
    }

    fn add_user(&mut self, user: &User) {
        self.put_user(user);
        if let Some(ids) = self.user_list.as_mut()
            && !ids.contains(&user.id)
        {
            ids.push(user.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::{chat, ids, message, order};

    fn cache_with(amount: Option<usize>) -> NormalizedCache {
        let mut cache = NormalizedCache::new();
        cache.write_chat_list(
            &[
                chat("1", &[message("1", "10", "a")]),
                chat("2", &[message("2", "20", "b")]),
            ],
            amount,
        );
        cache.write_chat(&chat(
            "2",
            &[message("2", "19", "z"), message("2", "20", "b")],
        ));
        cache
    }

    #[test]
    fn test_message_added_moves_chat_to_front_once() {
        let mut cache = cache_with(None);
        cache.apply(&CachePatch::MessageAdded(message("2", "21", "hi")));

        let list = cache.read_chat_list().unwrap();
        assert_eq!(order(&list), ["2", "1"]);
        assert_eq!(ids(&list[0]), ["20", "21"]);
        assert_eq!(ids(&cache.read_chat("2").unwrap()), ["19", "20", "21"]);
    }

    #[test]
    fn test_message_added_twice_is_idempotent() {
        let mut cache = cache_with(None);
        let patch = CachePatch::MessageAdded(message("2", "21", "hi"));
        cache.apply(&patch);
        cache.apply(&patch);

        let list = cache.read_chat_list().unwrap();
        assert_eq!(ids(&list[0]), ["20", "21"]);
        assert_eq!(ids(&cache.read_chat("2").unwrap()), ["19", "20", "21"]);
    }

    #[test]
    fn test_message_sequence_keeps_arrival_order_without_duplicates() {
        let mut cache = cache_with(None);
        for id in ["30", "31", "30", "32", "31"] {
            cache.apply(&CachePatch::MessageAdded(message("2", id, "x")));
        }
        assert_eq!(
            ids(&cache.read_chat("2").unwrap()),
            ["19", "20", "30", "31", "32"]
        );
    }

    #[test]
    fn test_message_added_respects_window() {
        let mut cache = cache_with(Some(1));
        cache.apply(&CachePatch::MessageAdded(message("1", "11", "new")));

        let list = cache.read_chat_list().unwrap();
        assert_eq!(order(&list), ["1", "2"]);
        assert_eq!(ids(&list[0]), ["11"]);
    }

    #[test]
    fn test_message_for_unknown_chat_leaves_list_alone() {
        let mut cache = cache_with(None);
        cache.apply(&CachePatch::MessageAdded(message("9", "90", "?")));

        assert_eq!(order(&cache.read_chat_list().unwrap()), ["1", "2"]);
        assert!(cache.read_chat("9").is_none());
    }

    #[test]
    fn test_same_message_id_in_two_chats_does_not_collide() {
        let mut cache = cache_with(None);
        cache.apply(&CachePatch::MessageAdded(message("1", "20", "other chat")));

        let list = cache.read_chat_list().unwrap();
        assert_eq!(list[0].messages.last().unwrap().content, "other chat");
        let detail = cache.read_chat("2").unwrap();
        assert_eq!(detail.messages[1].content, "b");
    }

    #[test]
    fn test_remove_ids_updates_both_views_and_is_idempotent() {
        let mut cache = cache_with(None);
        let all = cache.read_chat("2").unwrap().messages;
        let patch = CachePatch::MessagesRemoved {
            chat_id: "2".into(),
            removal: Removal::Ids(vec!["20".into()]),
            survivors: all.clone(),
        };

        cache.apply(&patch);
        let list = cache.read_chat_list().unwrap();
        let chat2 = list.iter().find(|c| c.id == "2").unwrap();
        assert_eq!(ids(chat2), ["19"]);
        assert_eq!(ids(&cache.read_chat("2").unwrap()), ["19"]);

        cache.apply(&patch);
        assert_eq!(ids(&cache.read_chat("2").unwrap()), ["19"]);
        let list = cache.read_chat_list().unwrap();
        assert_eq!(ids(list.iter().find(|c| c.id == "2").unwrap()), ["19"]);
    }

    #[test]
    fn test_remove_all_empties_both_views() {
        let mut cache = cache_with(None);
        let all = cache.read_chat("2").unwrap().messages;
        cache.apply(&CachePatch::MessagesRemoved {
            chat_id: "2".into(),
            removal: Removal::All,
            survivors: all,
        });

        assert!(cache.read_chat("2").unwrap().messages.is_empty());
        let list = cache.read_chat_list().unwrap();
        assert!(list.iter().find(|c| c.id == "2").unwrap().messages.is_empty());
        assert_eq!(cache.message_count(), 1, "only chat 1's message remains");
    }

    #[test]
    fn test_remove_without_survivors_filters_window() {
        let mut cache = cache_with(None);
        cache.apply(&CachePatch::MessagesRemoved {
            chat_id: "1".into(),
            removal: Removal::Ids(vec!["10".into()]),
            survivors: Vec::new(),
        });
        let list = cache.read_chat_list().unwrap();
        assert!(list[0].messages.is_empty());
    }

    #[test]
    fn test_removal_leaves_no_orphaned_entities() {
        let mut cache = cache_with(Some(1));
        let all = cache.read_chat("2").unwrap().messages;
        cache.apply(&CachePatch::MessagesRemoved {
            chat_id: "2".into(),
            removal: Removal::Ids(vec!["20".into()]),
            survivors: all,
        });
        assert_eq!(cache.message_count(), cache.referenced_keys().len());
    }

    #[test]
    fn test_chat_added_appends_once() {
        let mut cache = cache_with(None);
        let new_chat = chat("3", &[]);
        cache.apply(&CachePatch::ChatAdded(new_chat.clone()));
        cache.apply(&CachePatch::ChatAdded(new_chat));

        assert_eq!(order(&cache.read_chat_list().unwrap()), ["1", "2", "3"]);
    }

    #[test]
    fn test_chat_removed_clears_every_view() {
        let mut cache = cache_with(None);
        cache.apply(&CachePatch::ChatRemoved("2".into()));

        assert_eq!(order(&cache.read_chat_list().unwrap()), ["1"]);
        assert!(cache.read_chat("2").is_none());
        assert_eq!(cache.message_count(), 1);
    }

    #[test]
    fn test_user_added_is_idempotent_and_requires_cached_list() {
        let mut cache = NormalizedCache::new();
        cache.apply(&CachePatch::UserAdded(User::new("u-9")));
        assert!(cache.read_users().is_none());

        cache.write_users(&[User::new("u-1")]);
        cache.apply(&CachePatch::UserAdded(User::new("u-9")));
        cache.apply(&CachePatch::UserAdded(User::new("u-9")));
        let users = cache.read_users().unwrap();
        let user_ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(user_ids, ["u-1", "u-9"]);
    }
}
