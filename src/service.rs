//! Chat data operations over the GraphQL client and the live cache.

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::live::{LiveCache, LiveQuery};
use crate::session::SessionManager;
use chatcore::cache::{CachePatch, Removal};
use chatcore::graphql::{
    ADD_CHAT, ADD_GROUP, ADD_MESSAGE, AddChatData, AddChatVariables, AddGroupData,
    AddGroupVariables, AddMessageData, AddMessageVariables, GET_CHAT, GET_CHATS, GET_USERS,
    GetChatData, GetChatVariables, GetChatsData, GetChatsVariables, GetUsersData, NoVariables,
    REMOVE_ALL_MESSAGES, REMOVE_CHAT, REMOVE_MESSAGES, RemoveAllMessagesVariables,
    RemoveChatData, RemoveChatVariables, RemoveMessagesData, RemoveMessagesVariables,
};
use chatcore::types::{Chat, ChatId, Message, MessageId, User, UserId};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which messages [`ChatService::remove_messages`] deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTarget {
    Ids(Vec<MessageId>),
    All,
}

pub struct ChatService {
    client: Arc<Client>,
    session: Arc<SessionManager>,
    cache: Arc<LiveCache>,
    messages_amount: Option<usize>,
    optimistic_updates: bool,
    provisional_seq: AtomicU64,
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!("{operation} failed: {e}");
    }
    result
}

impl ChatService {
    pub fn new(
        client: Arc<Client>,
        session: Arc<SessionManager>,
        cache: Arc<LiveCache>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            client,
            session,
            cache,
            messages_amount: config.messages_amount,
            optimistic_updates: config.optimistic_updates,
            provisional_seq: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<LiveCache> {
        &self.cache
    }

    /// Live chat list, fetched only when nothing is cached yet.
    pub async fn get_chats(&self) -> Result<LiveQuery<Vec<Chat>>> {
        if !self.cache.read(|c| c.has_chat_list()) {
            self.refresh_chats().await?;
        }
        Ok(self.cache.watch_chats())
    }

    /// Refetches the chat list, replacing what is cached.
    pub async fn refresh_chats(&self) -> Result<Vec<Chat>> {
        let amount = self.messages_amount;
        let data: GetChatsData = self
            .client
            .execute(&GET_CHATS, GetChatsVariables { amount })
            .await?;
        debug!("Fetched {} chats", data.chats.len());
        self.cache.write(|c| c.write_chat_list(&data.chats, amount));
        Ok(data.chats)
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<LiveQuery<Chat>> {
        if !self.cache.read(|c| c.has_chat_detail(chat_id)) {
            let data: GetChatData = self
                .client
                .execute(
                    &GET_CHAT,
                    GetChatVariables {
                        chat_id: chat_id.to_string(),
                    },
                )
                .await?;
            let chat = data.chat.ok_or(ClientError::MissingData(GET_CHAT.name))?;
            self.cache.write(|c| c.write_chat(&chat));
        }
        Ok(self.cache.watch_chat(chat_id))
    }

    pub async fn get_users(&self) -> Result<LiveQuery<Vec<User>>> {
        if !self.cache.read(|c| c.has_user_list()) {
            let data: GetUsersData = self.client.execute(&GET_USERS, NoVariables {}).await?;
            self.cache.write(|c| c.write_users(&data.users));
        }
        Ok(self.cache.watch_users())
    }

    /// Sends a text message. With optimistic updates on, a provisional copy
    /// is shown until the server answers.
    pub async fn add_message(&self, chat_id: &str, content: &str) -> Result<Message> {
        let layer = match self.session.user() {
            Some(me) if self.optimistic_updates => {
                let seq = self.provisional_seq.fetch_add(1, Ordering::Relaxed);
                let provisional =
                    Message::provisional(format!("provisional-{seq}"), chat_id, me, content);
                Some(self.cache.push_optimistic(CachePatch::MessageAdded(provisional)))
            }
            _ => None,
        };

        let result = self
            .client
            .execute::<AddMessageData>(
                &ADD_MESSAGE,
                AddMessageVariables {
                    chat_id: chat_id.to_string(),
                    content: content.to_string(),
                },
            )
            .await
            .and_then(|data| {
                data.add_message
                    .ok_or(ClientError::MissingData(ADD_MESSAGE.name))
            });

        match result {
            Ok(message) => {
                let patch = CachePatch::MessageAdded(message.clone());
                match layer {
                    Some(layer) => self.cache.commit(layer, &patch),
                    None => self.cache.apply(&patch),
                }
                Ok(message)
            }
            Err(e) => {
                if let Some(layer) = layer {
                    self.cache.rollback(layer);
                }
                logged(ADD_MESSAGE.name, Err(e))
            }
        }
    }

    /// Deletes messages from a chat. `messages` is the caller's current view
    /// of the chat; the chat-list preview is rebuilt from what survives.
    pub async fn remove_messages(
        &self,
        chat_id: &str,
        messages: &[Message],
        target: RemoveTarget,
    ) -> Result<Vec<MessageId>> {
        let (operation, result) = match &target {
            RemoveTarget::Ids(ids) => (
                REMOVE_MESSAGES.name,
                self.client
                    .execute::<RemoveMessagesData>(
                        &REMOVE_MESSAGES,
                        RemoveMessagesVariables {
                            chat_id: chat_id.to_string(),
                            message_ids: ids.clone(),
                        },
                    )
                    .await,
            ),
            RemoveTarget::All => (
                REMOVE_ALL_MESSAGES.name,
                self.client
                    .execute::<RemoveMessagesData>(
                        &REMOVE_ALL_MESSAGES,
                        RemoveAllMessagesVariables {
                            chat_id: chat_id.to_string(),
                            all: true,
                        },
                    )
                    .await,
            ),
        };
        let data = logged(operation, result)?;

        let (removal, removed) = match target {
            RemoveTarget::Ids(requested) => {
                let confirmed = data.remove_messages.unwrap_or(requested);
                (Removal::Ids(confirmed.clone()), confirmed)
            }
            RemoveTarget::All => {
                let derived = messages.iter().map(|m| m.id.clone()).collect();
                (Removal::All, data.remove_messages.unwrap_or(derived))
            }
        };
        let survivors = match &removal {
            Removal::Ids(ids) => messages
                .iter()
                .filter(|m| !ids.contains(&m.id))
                .cloned()
                .collect(),
            Removal::All => Vec::new(),
        };

        self.cache.apply(&CachePatch::MessagesRemoved {
            chat_id: chat_id.to_string(),
            removal,
            survivors,
        });
        info!("Removed {} messages from chat {chat_id}", removed.len());
        Ok(removed)
    }

    pub async fn add_chat(&self, recipient_id: &str) -> Result<Chat> {
        let result = self
            .client
            .execute::<AddChatData>(
                &ADD_CHAT,
                AddChatVariables {
                    recipient_id: recipient_id.to_string(),
                },
            )
            .await
            .and_then(|data| data.add_chat.ok_or(ClientError::MissingData(ADD_CHAT.name)));
        let chat = logged(ADD_CHAT.name, result)?;
        self.cache.apply(&CachePatch::ChatAdded(chat.clone()));
        Ok(chat)
    }

    pub async fn add_group(&self, recipient_ids: &[UserId], group_name: &str) -> Result<Chat> {
        let result = self
            .client
            .execute::<AddGroupData>(
                &ADD_GROUP,
                AddGroupVariables {
                    recipient_ids: recipient_ids.to_vec(),
                    group_name: group_name.to_string(),
                },
            )
            .await
            .and_then(|data| {
                data.add_group
                    .ok_or(ClientError::MissingData(ADD_GROUP.name))
            });
        let chat = logged(ADD_GROUP.name, result)?;
        self.cache.apply(&CachePatch::ChatAdded(chat.clone()));
        Ok(chat)
    }

    pub async fn remove_chat(&self, chat_id: &str) -> Result<ChatId> {
        let result = self
            .client
            .execute::<RemoveChatData>(
                &REMOVE_CHAT,
                RemoveChatVariables {
                    chat_id: chat_id.to_string(),
                },
            )
            .await;
        let data = logged(REMOVE_CHAT.name, result)?;
        let removed = data.remove_chat.unwrap_or_else(|| chat_id.to_string());
        self.cache.apply(&CachePatch::ChatRemoved(removed.clone()));
        Ok(removed)
    }

    /// Id of the cached one-to-one chat between the current user and
    /// `recipient_id`, if there is one.
    pub fn get_chat_id(&self, recipient_id: &str) -> Option<ChatId> {
        let me = self.session.user_id()?;
        self.cache.read(|c| c.find_direct_chat(&me, recipient_id))
    }
}
