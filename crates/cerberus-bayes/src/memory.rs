use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::{BayesStorage, TokenUpdate};
use crate::types::{ClassStats, ModelStats, Scope, TokenStats};

/// In-memory Bayes storage for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryBayesStorage {
    tokens: Mutex<HashMap<(Option<i64>, String), TokenStats>>,
    classes: Mutex<HashMap<(Option<i64>, bool), ClassStats>>,
}

impl MemoryBayesStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BayesStorage for MemoryBayesStorage {
    fn token_stats(&self, token: &str, scope: Scope) -> Result<Option<TokenStats>> {
        let tokens = self.tokens.lock().unwrap();
        Ok(tokens.get(&(scope.chat_id(), token.to_string())).cloned())
    }

    fn class_stats(&self, is_spam: bool, scope: Scope) -> Result<ClassStats> {
        let classes = self.classes.lock().unwrap();
        Ok(classes
            .get(&(scope.chat_id(), is_spam))
            .copied()
            .unwrap_or_default())
    }

    fn update_token_stats(
        &self,
        token: &str,
        is_spam: bool,
        increment: i64,
        scope: Scope,
    ) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap();
        let entry = tokens
            .entry((scope.chat_id(), token.to_string()))
            .or_insert_with(|| TokenStats {
                token: token.to_string(),
                spam_count: 0,
                ham_count: 0,
                total_count: 0,
            });
        if is_spam {
            entry.spam_count += increment;
        } else {
            entry.ham_count += increment;
        }
        entry.total_count += increment;
        Ok(())
    }

    fn update_class_stats(
        &self,
        is_spam: bool,
        message_increment: i64,
        token_increment: i64,
        scope: Scope,
    ) -> Result<()> {
        let mut classes = self.classes.lock().unwrap();
        let entry = classes.entry((scope.chat_id(), is_spam)).or_default();
        entry.message_count += message_increment;
        entry.token_count += token_increment;
        Ok(())
    }

    fn batch_update_tokens(&self, updates: &[TokenUpdate], scope: Scope) -> Result<()> {
        for update in updates {
            self.update_token_stats(&update.token, update.is_spam, update.increment, scope)?;
        }
        Ok(())
    }

    fn vocabulary_size(&self, scope: Scope) -> Result<usize> {
        let tokens = self.tokens.lock().unwrap();
        Ok(tokens
            .keys()
            .filter(|(chat_id, _)| *chat_id == scope.chat_id())
            .count())
    }

    fn model_stats(&self, scope: Scope) -> Result<ModelStats> {
        let spam = self.class_stats(true, scope)?;
        let ham = self.class_stats(false, scope)?;
        Ok(ModelStats {
            spam_messages: spam.message_count,
            ham_messages: ham.message_count,
            total_tokens: spam.token_count + ham.token_count,
            vocabulary_size: self.vocabulary_size(scope)?,
            chat_id: scope.chat_id(),
        })
    }

    fn clear_stats(&self, scope: Scope) -> Result<()> {
        self.tokens
            .lock()
            .unwrap()
            .retain(|(chat_id, _), _| *chat_id != scope.chat_id());
        self.classes
            .lock()
            .unwrap()
            .retain(|(chat_id, _), _| *chat_id != scope.chat_id());
        Ok(())
    }

    fn top_spam_tokens(&self, limit: usize, scope: Scope) -> Result<Vec<TokenStats>> {
        Ok(self.top_tokens(limit, scope, true))
    }

    fn top_ham_tokens(&self, limit: usize, scope: Scope) -> Result<Vec<TokenStats>> {
        Ok(self.top_tokens(limit, scope, false))
    }

    fn cleanup_rare_tokens(&self, min_count: i64, scope: Scope) -> Result<usize> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|(chat_id, _), stats| {
            *chat_id != scope.chat_id() || stats.total_count >= min_count
        });
        Ok(before - tokens.len())
    }
}

impl MemoryBayesStorage {
    fn top_tokens(&self, limit: usize, scope: Scope, spam: bool) -> Vec<TokenStats> {
        let tokens = self.tokens.lock().unwrap();
        let mut candidates: Vec<TokenStats> = tokens
            .iter()
            .filter(|((chat_id, _), stats)| {
                *chat_id == scope.chat_id() && stats.total_count >= 2
            })
            .map(|(_, stats)| stats.clone())
            .collect();
        candidates.sort_by(|a, b| {
            let ratio = |s: &TokenStats| {
                let count = if spam { s.spam_count } else { s.ham_count };
                count as f64 / s.total_count as f64
            };
            ratio(b)
                .partial_cmp(&ratio(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let count = |s: &TokenStats| if spam { s.spam_count } else { s.ham_count };
                    count(b).cmp(&count(a))
                })
        });
        candidates.truncate(limit);
        candidates
    }
}
