use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Taxonomy of stored messages. Outbound bot messages carry a category so
/// later pipeline stages can recognize bot-authored error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    User,
    UserCommand,
    UserSpam,
    BotCommandReply,
    BotError,
    BotSpamNotification,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::User => "user",
            MessageCategory::UserCommand => "user_command",
            MessageCategory::UserSpam => "user_spam",
            MessageCategory::BotCommandReply => "bot_command_reply",
            MessageCategory::BotError => "bot_error",
            MessageCategory::BotSpamNotification => "bot_spam_notification",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageCategory::User),
            "user_command" => Ok(MessageCategory::UserCommand),
            "user_spam" => Ok(MessageCategory::UserSpam),
            "bot_command_reply" => Ok(MessageCategory::BotCommandReply),
            "bot_error" => Ok(MessageCategory::BotError),
            "bot_spam_notification" => Ok(MessageCategory::BotSpamNotification),
            other => Err(format!("unknown message category: {other}")),
        }
    }
}

/// Why a message landed in the spam (or ham) store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamReason {
    /// Flagged by the automatic decision engine.
    Auto,
    /// An admin marked it via /spam or /learn_spam.
    Admin,
    /// A regular user marked it via /spam.
    User,
    /// Migrated to ham when the sender was unbanned.
    Unban,
}

impl SpamReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamReason::Auto => "auto",
            SpamReason::Admin => "admin",
            SpamReason::User => "user",
            SpamReason::Unban => "unban",
        }
    }
}

impl fmt::Display for SpamReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpamReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SpamReason::Auto),
            "admin" => Ok(SpamReason::Admin),
            "user" => Ok(SpamReason::User),
            "unban" => Ok(SpamReason::Unban),
            other => Err(format!("unknown spam reason: {other}")),
        }
    }
}
