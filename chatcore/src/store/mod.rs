pub mod error;
pub mod traits;

pub use error::{Result, StoreError};
pub use traits::{AUTH_HEADER_KEY, SessionStore, USER_KEY};
