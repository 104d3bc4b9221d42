//! GraphQL documents consumed by the client.

macro_rules! user_fragment {
    () => {
        "fragment User on User { id name picture phone }"
    };
}

macro_rules! message_fragment {
    () => {
        "fragment Message on Message { id chat { id } sender { ...User } content createdAt type ownership recipients { user { ...User } receivedAt readAt } }"
    };
}

macro_rules! chat_without_messages_fragment {
    () => {
        "fragment ChatWithoutMessages on Chat { id name picture allTimeMembers { ...User } unreadMessages isGroup }"
    };
}

pub const USER_FRAGMENT: &str = user_fragment!();
pub const MESSAGE_FRAGMENT: &str = message_fragment!();
pub const CHAT_WITHOUT_MESSAGES_FRAGMENT: &str = chat_without_messages_fragment!();

pub const GET_CHATS: &str = concat!(
    "query GetChats($amount: Int) { chats { ...ChatWithoutMessages messages(amount: $amount) { ...Message } } } ",
    chat_without_messages_fragment!(),
    " ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

pub const GET_CHAT: &str = concat!(
    "query GetChat($chatId: ID!) { chat(chatId: $chatId) { ...ChatWithoutMessages messages { ...Message } } } ",
    chat_without_messages_fragment!(),
    " ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

pub const GET_USERS: &str = concat!(
    "query GetUsers { users { ...User } } ",
    user_fragment!(),
);

pub const ADD_CHAT: &str = concat!(
    "mutation AddChat($recipientId: ID!) { addChat(recipientId: $recipientId) { ...ChatWithoutMessages messages { ...Message } } } ",
    chat_without_messages_fragment!(),
    " ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

pub const ADD_GROUP: &str = concat!(
    "mutation AddGroup($recipientIds: [ID!]!, $groupName: String!) { addGroup(recipientIds: $recipientIds, groupName: $groupName) { ...ChatWithoutMessages messages { ...Message } } } ",
    chat_without_messages_fragment!(),
    " ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

pub const ADD_MESSAGE: &str = concat!(
    "mutation AddMessage($chatId: ID!, $content: String!) { addMessage(chatId: $chatId, content: $content) { ...Message } } ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

pub const REMOVE_MESSAGES: &str =
    "mutation RemoveMessages($chatId: ID!, $messageIds: [ID]) { removeMessages(chatId: $chatId, messageIds: $messageIds) }";

pub const REMOVE_ALL_MESSAGES: &str =
    "mutation RemoveAllMessages($chatId: ID!, $all: Boolean) { removeMessages(chatId: $chatId, all: $all) }";

pub const REMOVE_CHAT: &str =
    "mutation RemoveChat($chatId: ID!) { removeChat(chatId: $chatId) }";

pub const USER_ADDED: &str = concat!(
    "subscription UserAdded { userAdded { ...User } } ",
    user_fragment!(),
);

pub const MESSAGE_ADDED: &str = concat!(
    "subscription MessageAdded { messageAdded { ...Message } } ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

pub const CHAT_ADDED: &str = concat!(
    "subscription ChatAdded { chatAdded { ...ChatWithoutMessages messages(amount: 1) { ...Message } } } ",
    chat_without_messages_fragment!(),
    " ",
    message_fragment!(),
    " ",
    user_fragment!(),
);

#[cfg(test)]
mod tests {
    use super::*;

    /// Every fragment a document spreads must be defined in that document.
    fn assert_fragments_defined(document: &str) {
        for (spread, definition) in [
            ("...User", "fragment User on User"),
            ("...Message", "fragment Message on Message"),
            ("...ChatWithoutMessages", "fragment ChatWithoutMessages on Chat"),
        ] {
            if document.contains(spread) {
                assert!(
                    document.contains(definition),
                    "{spread} used without its definition in: {document}"
                );
            }
        }
    }

    #[test]
    fn test_documents_are_self_contained() {
        for document in [
            GET_CHATS,
            GET_CHAT,
            GET_USERS,
            ADD_CHAT,
            ADD_GROUP,
            ADD_MESSAGE,
            REMOVE_MESSAGES,
            REMOVE_ALL_MESSAGES,
            REMOVE_CHAT,
            USER_ADDED,
            MESSAGE_ADDED,
            CHAT_ADDED,
        ] {
            assert_fragments_defined(document);
        }
    }

    #[test]
    fn test_fragment_constants_match_documents() {
        assert!(GET_CHATS.contains(CHAT_WITHOUT_MESSAGES_FRAGMENT));
        assert!(ADD_MESSAGE.contains(MESSAGE_FRAGMENT));
        assert!(GET_USERS.contains(USER_FRAGMENT));
    }
}
