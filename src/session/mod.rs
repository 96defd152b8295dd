pub mod bookkeeping;
pub mod store;
pub mod types;

pub use store::{JsonFileStore, MemoryStore, SessionStore};
pub use types::{Message, MessageStatus, Sender, Session};
