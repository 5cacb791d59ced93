use crate::error::Result;
use crate::types::{ClassStats, ModelStats, Scope, TokenStats};

/// One token delta inside a batch update.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub token: String,
    pub is_spam: bool,
    pub increment: i64,
}

/// Per-scope token and class counters behind the Bayes filter.
///
/// Counts are monotone non-decreasing except through [`clear_stats`] and
/// [`cleanup_rare_tokens`]. Transactional backends must apply
/// [`batch_update_tokens`] atomically.
///
/// [`clear_stats`]: BayesStorage::clear_stats
/// [`cleanup_rare_tokens`]: BayesStorage::cleanup_rare_tokens
pub trait BayesStorage: Send + Sync {
    fn token_stats(&self, token: &str, scope: Scope) -> Result<Option<TokenStats>>;

    /// Zero-valued stats when the class has never been seen in this scope.
    fn class_stats(&self, is_spam: bool, scope: Scope) -> Result<ClassStats>;

    fn update_token_stats(
        &self,
        token: &str,
        is_spam: bool,
        increment: i64,
        scope: Scope,
    ) -> Result<()>;

    fn update_class_stats(
        &self,
        is_spam: bool,
        message_increment: i64,
        token_increment: i64,
        scope: Scope,
    ) -> Result<()>;

    fn batch_update_tokens(&self, updates: &[TokenUpdate], scope: Scope) -> Result<()>;

    /// Number of distinct tokens known to this scope.
    fn vocabulary_size(&self, scope: Scope) -> Result<usize>;

    fn model_stats(&self, scope: Scope) -> Result<ModelStats>;

    fn clear_stats(&self, scope: Scope) -> Result<()>;

    /// Strongest spam indicators: ordered by spam_count/total_count
    /// descending, requiring total_count >= 2.
    fn top_spam_tokens(&self, limit: usize, scope: Scope) -> Result<Vec<TokenStats>>;

    fn top_ham_tokens(&self, limit: usize, scope: Scope) -> Result<Vec<TokenStats>>;

    /// Delete tokens with total_count below `min_count`; returns how many
    /// were removed.
    fn cleanup_rare_tokens(&self, min_count: i64, scope: Scope) -> Result<usize>;
}
