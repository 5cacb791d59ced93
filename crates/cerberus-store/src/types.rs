use std::collections::HashMap;

use cerberus_core::{MessageCategory, SpamReason};
use serde::{Deserialize, Serialize};

/// Per-(chat, user) record tracking observed volume and moderation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub messages_count: i64,
    pub is_spammer: bool,
    /// Free-form string map; `notSpammer = "true"` marks an unbanned user
    /// whose spam checks are skipped.
    pub metadata: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatUser {
    pub fn not_spammer(&self) -> bool {
        self.metadata
            .get("notSpammer")
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

/// One row of the observed chat message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub message_text: String,
    pub category: MessageCategory,
    pub created_at: String,
}

/// A spam (or migrated ham) exemplar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub message_text: String,
    pub reason: SpamReason,
    pub score: f64,
    pub created_at: String,
}
