//! Operation descriptors with their variables and response shapes.

use crate::graphql::documents;
use crate::graphql::{Operation, OperationKind};
use crate::types::{Chat, ChatId, Message, MessageId, User, UserId};
use serde::{Deserialize, Serialize};

macro_rules! operation {
    ($const_name:ident, $name:literal, $kind:ident, $document:path) => {
        pub const $const_name: Operation = Operation {
            name: $name,
            kind: OperationKind::$kind,
            document: $document,
        };
    };
}

operation!(GET_CHATS, "GetChats", Query, documents::GET_CHATS);
operation!(GET_CHAT, "GetChat", Query, documents::GET_CHAT);
operation!(GET_USERS, "GetUsers", Query, documents::GET_USERS);
operation!(ADD_CHAT, "AddChat", Mutation, documents::ADD_CHAT);
operation!(ADD_GROUP, "AddGroup", Mutation, documents::ADD_GROUP);
operation!(ADD_MESSAGE, "AddMessage", Mutation, documents::ADD_MESSAGE);
operation!(REMOVE_MESSAGES, "RemoveMessages", Mutation, documents::REMOVE_MESSAGES);
operation!(
    REMOVE_ALL_MESSAGES,
    "RemoveAllMessages",
    Mutation,
    documents::REMOVE_ALL_MESSAGES
);
operation!(REMOVE_CHAT, "RemoveChat", Mutation, documents::REMOVE_CHAT);
operation!(USER_ADDED, "UserAdded", Subscription, documents::USER_ADDED);
operation!(MESSAGE_ADDED, "MessageAdded", Subscription, documents::MESSAGE_ADDED);
operation!(CHAT_ADDED, "ChatAdded", Subscription, documents::CHAT_ADDED);

/// For operations that take no variables.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoVariables {}

#[derive(Debug, Clone, Serialize)]
pub struct GetChatsVariables {
    pub amount: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetChatVariables {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChatVariables {
    pub recipient_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddGroupVariables {
    pub recipient_ids: Vec<UserId>,
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageVariables {
    pub chat_id: ChatId,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMessagesVariables {
    pub chat_id: ChatId,
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveAllMessagesVariables {
    pub chat_id: ChatId,
    pub all: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveChatVariables {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetChatsData {
    #[serde(default)]
    pub chats: Vec<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetChatData {
    pub chat: Option<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetUsersData {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChatData {
    pub add_chat: Option<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddGroupData {
    pub add_group: Option<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageData {
    pub add_message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMessagesData {
    #[serde(default)]
    pub remove_messages: Option<Vec<MessageId>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveChatData {
    pub remove_chat: Option<ChatId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAddedData {
    pub user_added: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAddedData {
    pub message_added: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAddedData {
    pub chat_added: Option<Chat>,
}
