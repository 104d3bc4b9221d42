// Re-export core modules
pub use chatcore::{cache, graphql, net, types, ws};

pub mod events {
    pub use chatcore::events::*;
}

pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod live;
pub mod service;
pub mod session;
pub mod store;
pub mod subscriptions;
pub mod views;

#[cfg(test)]
mod test_utils;

pub use client::Client;
pub use config::ClientConfig;
pub use error::ClientError;
pub use service::ChatService;
pub use session::{LoginService, SessionManager};
