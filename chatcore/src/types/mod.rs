pub mod chat;
pub mod message;
pub mod timestamp;
pub mod user;

pub use chat::{Chat, ChatId};
pub use message::{ChatRef, Message, MessageId, MessageKey, MessageType, Recipient};
pub use user::{User, UserId};
