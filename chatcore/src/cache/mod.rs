//! Client-side normalized cache for the chat list, chat details and user list.

pub mod optimistic;
pub mod patch;
pub mod store;

pub use optimistic::{LayerId, LayeredCache};
pub use patch::{CachePatch, Removal};
pub use store::NormalizedCache;
