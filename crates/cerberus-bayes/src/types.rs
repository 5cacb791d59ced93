use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Target of Bayes statistics: the global corpus or a specific chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Chat(i64),
}

impl Scope {
    pub fn chat_id(self) -> Option<i64> {
        match self {
            Scope::Global => None,
            Scope::Chat(id) => Some(id),
        }
    }

    pub fn from_chat_id(chat_id: Option<i64>) -> Self {
        match chat_id {
            Some(id) => Scope::Chat(id),
            None => Scope::Global,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Chat(id) => write!(f, "chat {id}"),
        }
    }
}

/// Per-token counters. Invariant: `total_count == spam_count + ham_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    pub token: String,
    pub spam_count: i64,
    pub ham_count: i64,
    pub total_count: i64,
}

/// Per-class counters for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    pub message_count: i64,
    pub token_count: i64,
}

/// Aggregate model statistics for one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub spam_messages: i64,
    pub ham_messages: i64,
    pub total_tokens: i64,
    pub vocabulary_size: usize,
    pub chat_id: Option<i64>,
}

impl ModelStats {
    pub fn total_messages(&self) -> i64 {
        self.spam_messages + self.ham_messages
    }

    pub fn spam_ratio(&self) -> f64 {
        let total = self.total_messages();
        if total == 0 {
            0.0
        } else {
            self.spam_messages as f64 / total as f64
        }
    }

    pub fn ham_ratio(&self) -> f64 {
        let total = self.total_messages();
        if total == 0 {
            0.0
        } else {
            self.ham_messages as f64 / total as f64
        }
    }
}

/// Classification result. `score` is on a 0-100 scale; `token_scores`
/// carries per-token spam probabilities for debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamScore {
    pub score: f64,
    pub is_spam: bool,
    pub confidence: f64,
    pub token_scores: HashMap<String, f64>,
}

impl SpamScore {
    /// Neutral score used when the model cannot classify.
    pub fn neutral() -> Self {
        Self {
            score: 50.0,
            is_spam: false,
            confidence: 0.0,
            token_scores: HashMap::new(),
        }
    }
}

/// Outcome of a batch training run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLearnStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub spam_learned: usize,
    pub ham_learned: usize,
}
