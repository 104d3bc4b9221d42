pub mod cache;
pub mod events;
pub mod graphql;
pub mod net;
pub mod store;
pub mod types;
pub mod ws;
