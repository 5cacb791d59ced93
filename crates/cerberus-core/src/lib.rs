pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use error::{CoreError, Result};
pub use settings::{ChatSettings, ChatSettingsKey, ChatSettingsValue, SettingType};
pub use types::{MessageCategory, SpamReason};
