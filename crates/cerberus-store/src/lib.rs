//! Persistent chat state: chat users, the chat message log, spam/ham
//! exemplar stores, and per-chat settings overrides.

pub mod db;
pub mod error;
pub mod settings;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use settings::SettingsStore;
pub use store::ChatStore;
pub use types::{ChatMessage, ChatUser, SpamMessage};
