pub mod filestore;
pub mod memory;

pub use chatcore::store::{AUTH_HEADER_KEY, SessionStore, StoreError, USER_KEY};
pub use filestore::FileStore;
pub use memory::MemoryStore;
