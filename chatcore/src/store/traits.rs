use crate::store::error::Result;
use async_trait::async_trait;

/// Key holding the auth header string sent with every request.
pub const AUTH_HEADER_KEY: &str = "Authorization";
/// Key holding the JSON-serialized current user.
pub const USER_KEY: &str = "user";

/// Persistent string key/value storage for client session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}
