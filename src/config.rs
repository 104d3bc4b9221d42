use std::path::PathBuf;

const DEFAULT_SERVER: &str = "http://localhost:4000";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// GraphQL endpoint for queries and mutations.
    pub graphql_url: String,
    /// WebSocket endpoint for subscriptions.
    pub subscriptions_url: String,
    /// Base URL of the `/signin` and `/signup` endpoints.
    pub auth_url: String,
    /// Messages kept per chat in the chat list (`GetChats(amount)`).
    pub messages_amount: Option<usize>,
    /// Directory holding the persisted session.
    pub store_path: PathBuf,
    /// Show sent messages before the server confirms them.
    pub optimistic_updates: bool,
}

impl ClientConfig {
    /// Derives every endpoint from one server base URL.
    pub fn for_server(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        Self {
            graphql_url: format!("{base}/graphql"),
            subscriptions_url: format!("{ws_base}/graphql"),
            auth_url: base.to_string(),
            messages_amount: Some(3),
            store_path: PathBuf::from(".whatsapp-session"),
            optimistic_updates: true,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_server(DEFAULT_SERVER)
    }
}
