//! Per-chat settings: a closed set of typed keys with defaults in code and
//! per-chat overrides in storage. Resolution order: override > default.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::error;

/// Semantic type of a setting value. Values are stored as strings and parsed
/// on access; the type drives the settings wizard UI and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingType {
    Str,
    Int,
    Float,
    Bool,
    StrList,
}

/// Closed enumeration of recognized chat settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatSettingsKey {
    DetectSpam,
    AutoSpamMaxMessages,
    SpamWarnThreshold,
    SpamBanThreshold,
    BayesEnabled,
    BayesAutoLearn,
    BayesMinConfidence,
    SpamDeleteAllUserMessages,
    AllowMarkSpamOldUsers,
    AllowUserSpamCommand,
    AdminCanChangeSettings,
    ChatModel,
    FallbackModel,
    SummaryModel,
    CondensingModel,
    BotNicknames,
}

impl ChatSettingsKey {
    pub const ALL: [ChatSettingsKey; 16] = [
        ChatSettingsKey::DetectSpam,
        ChatSettingsKey::AutoSpamMaxMessages,
        ChatSettingsKey::SpamWarnThreshold,
        ChatSettingsKey::SpamBanThreshold,
        ChatSettingsKey::BayesEnabled,
        ChatSettingsKey::BayesAutoLearn,
        ChatSettingsKey::BayesMinConfidence,
        ChatSettingsKey::SpamDeleteAllUserMessages,
        ChatSettingsKey::AllowMarkSpamOldUsers,
        ChatSettingsKey::AllowUserSpamCommand,
        ChatSettingsKey::AdminCanChangeSettings,
        ChatSettingsKey::ChatModel,
        ChatSettingsKey::FallbackModel,
        ChatSettingsKey::SummaryModel,
        ChatSettingsKey::CondensingModel,
        ChatSettingsKey::BotNicknames,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSettingsKey::DetectSpam => "detect-spam",
            ChatSettingsKey::AutoSpamMaxMessages => "auto-spam-max-messages",
            ChatSettingsKey::SpamWarnThreshold => "spam-warn-threshold",
            ChatSettingsKey::SpamBanThreshold => "spam-ban-threshold",
            ChatSettingsKey::BayesEnabled => "bayes-enabled",
            ChatSettingsKey::BayesAutoLearn => "bayes-auto-learn",
            ChatSettingsKey::BayesMinConfidence => "bayes-min-confidence",
            ChatSettingsKey::SpamDeleteAllUserMessages => "spam-delete-all-user-messages",
            ChatSettingsKey::AllowMarkSpamOldUsers => "allow-mark-spam-old-users",
            ChatSettingsKey::AllowUserSpamCommand => "allow-user-spam-command",
            ChatSettingsKey::AdminCanChangeSettings => "admin-can-change-settings",
            ChatSettingsKey::ChatModel => "chat-model",
            ChatSettingsKey::FallbackModel => "fallback-model",
            ChatSettingsKey::SummaryModel => "summary-model",
            ChatSettingsKey::CondensingModel => "condensing-model",
            ChatSettingsKey::BotNicknames => "bot-nicknames",
        }
    }

    pub fn value_type(&self) -> SettingType {
        match self {
            ChatSettingsKey::DetectSpam
            | ChatSettingsKey::BayesEnabled
            | ChatSettingsKey::BayesAutoLearn
            | ChatSettingsKey::SpamDeleteAllUserMessages
            | ChatSettingsKey::AllowMarkSpamOldUsers
            | ChatSettingsKey::AllowUserSpamCommand
            | ChatSettingsKey::AdminCanChangeSettings => SettingType::Bool,
            ChatSettingsKey::AutoSpamMaxMessages => SettingType::Int,
            ChatSettingsKey::SpamWarnThreshold
            | ChatSettingsKey::SpamBanThreshold
            | ChatSettingsKey::BayesMinConfidence => SettingType::Float,
            ChatSettingsKey::BotNicknames => SettingType::StrList,
            _ => SettingType::Str,
        }
    }

    /// Short label shown in the settings wizard.
    pub fn label(&self) -> &'static str {
        match self {
            ChatSettingsKey::DetectSpam => "Detect spam",
            ChatSettingsKey::AutoSpamMaxMessages => "Auto-spam message ceiling",
            ChatSettingsKey::SpamWarnThreshold => "Spam warn threshold",
            ChatSettingsKey::SpamBanThreshold => "Spam ban threshold",
            ChatSettingsKey::BayesEnabled => "Bayes filter",
            ChatSettingsKey::BayesAutoLearn => "Bayes auto-learn",
            ChatSettingsKey::BayesMinConfidence => "Bayes min confidence",
            ChatSettingsKey::SpamDeleteAllUserMessages => "Delete all spammer messages",
            ChatSettingsKey::AllowMarkSpamOldUsers => "Allow marking old users",
            ChatSettingsKey::AllowUserSpamCommand => "Allow /spam for users",
            ChatSettingsKey::AdminCanChangeSettings => "Admins can change settings",
            ChatSettingsKey::ChatModel => "Chat model",
            ChatSettingsKey::FallbackModel => "Fallback model",
            ChatSettingsKey::SummaryModel => "Summary model",
            ChatSettingsKey::CondensingModel => "Condensing model",
            ChatSettingsKey::BotNicknames => "Bot nicknames",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChatSettingsKey::DetectSpam => "Run the spam decision engine on group messages",
            ChatSettingsKey::AutoSpamMaxMessages => {
                "Skip the spam check for users with at least this many messages; 0 disables the ceiling"
            }
            ChatSettingsKey::SpamWarnThreshold => "Score at which a warning is posted (0-100)",
            ChatSettingsKey::SpamBanThreshold => "Score above which the sender is banned (0-100)",
            ChatSettingsKey::BayesEnabled => "Let the Bayes classifier contribute to the spam score",
            ChatSettingsKey::BayesAutoLearn => "Learn marked spam messages into the Bayes corpus",
            ChatSettingsKey::BayesMinConfidence => {
                "Minimum classifier confidence required to trust its score (0-1)"
            }
            ChatSettingsKey::SpamDeleteAllUserMessages => {
                "On ban, bulk-delete the spammer's recent messages"
            }
            ChatSettingsKey::AllowMarkSpamOldUsers => {
                "Permit admins to mark established users as spammers"
            }
            ChatSettingsKey::AllowUserSpamCommand => "Permit non-admins to use the /spam command",
            ChatSettingsKey::AdminCanChangeSettings => {
                "Permit chat admins to change settings via the wizard"
            }
            ChatSettingsKey::ChatModel => "LLM model identifier for chat replies",
            ChatSettingsKey::FallbackModel => "LLM model used when the chat model fails",
            ChatSettingsKey::SummaryModel => "LLM model used for summaries",
            ChatSettingsKey::CondensingModel => "LLM model used to condense oversized pages",
            ChatSettingsKey::BotNicknames => "Comma-separated names the bot answers to",
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            ChatSettingsKey::DetectSpam => "true",
            ChatSettingsKey::AutoSpamMaxMessages => "5",
            ChatSettingsKey::SpamWarnThreshold => "40",
            ChatSettingsKey::SpamBanThreshold => "60",
            ChatSettingsKey::BayesEnabled => "true",
            ChatSettingsKey::BayesAutoLearn => "true",
            ChatSettingsKey::BayesMinConfidence => "0.1",
            ChatSettingsKey::SpamDeleteAllUserMessages => "false",
            ChatSettingsKey::AllowMarkSpamOldUsers => "false",
            ChatSettingsKey::AllowUserSpamCommand => "false",
            ChatSettingsKey::AdminCanChangeSettings => "true",
            ChatSettingsKey::ChatModel => "gpt-4o-mini",
            ChatSettingsKey::FallbackModel => "gpt-4o-mini",
            ChatSettingsKey::SummaryModel => "gpt-4o-mini",
            ChatSettingsKey::CondensingModel => "gpt-4o-mini",
            ChatSettingsKey::BotNicknames => "",
        }
    }
}

impl fmt::Display for ChatSettingsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatSettingsKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChatSettingsKey::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown settings key: {s}"))
    }
}

/// A raw setting value. Stored as a string, parsed on access; parse failures
/// log and fall back to the zero value, matching how misconfigured chats
/// should degrade rather than crash the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettingsValue(pub String);

impl ChatSettingsValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_int(&self) -> i64 {
        match self.0.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                error!(value = %self.0, "failed to parse setting as int");
                0
            }
        }
    }

    pub fn to_float(&self) -> f64 {
        match self.0.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                error!(value = %self.0, "failed to parse setting as float");
                0.0
            }
        }
    }

    pub fn to_bool(&self) -> bool {
        self.0.trim().eq_ignore_ascii_case("true")
    }

    pub fn to_list(&self) -> Vec<String> {
        self.0
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl fmt::Display for ChatSettingsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved settings snapshot for one chat. Built once per pipeline
/// invocation; lookups never miss because defaults are baked in.
#[derive(Debug, Clone, Default)]
pub struct ChatSettings {
    overrides: HashMap<ChatSettingsKey, ChatSettingsValue>,
}

impl ChatSettings {
    pub fn new(overrides: HashMap<ChatSettingsKey, ChatSettingsValue>) -> Self {
        Self { overrides }
    }

    pub fn get(&self, key: ChatSettingsKey) -> ChatSettingsValue {
        self.overrides
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ChatSettingsValue::new(key.default_value()))
    }

    pub fn is_overridden(&self, key: ChatSettingsKey) -> bool {
        self.overrides.contains_key(&key)
    }
}
