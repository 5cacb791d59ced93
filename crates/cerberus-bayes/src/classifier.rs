//! Multinomial naive Bayes filter with Laplace smoothing and online
//! learning. Supports global and per-chat statistics.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{BayesError, Result};
use crate::storage::{BayesStorage, TokenUpdate};
use crate::tokenizer::{Tokenizer, TokenizerConfig};
use crate::types::{BatchLearnStats, ModelStats, Scope, SpamScore};

#[derive(Debug, Clone)]
pub struct BayesConfig {
    /// Laplace smoothing parameter.
    pub alpha: f64,
    /// Minimum total occurrences for a token to participate in
    /// classification.
    pub min_token_count: i64,
    /// Per-chat statistics when true, global otherwise.
    pub per_chat_stats: bool,
    /// Default spam threshold on the 0-100 scale.
    pub default_threshold: f64,
    /// Minimum confidence to trust a classification.
    pub min_confidence: f64,
    /// Token cap per message.
    pub max_tokens_per_message: usize,
    pub tokenizer: TokenizerConfig,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            min_token_count: 2,
            per_chat_stats: true,
            default_threshold: 50.0,
            min_confidence: 0.1,
            max_tokens_per_message: 1000,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl BayesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.alpha <= 0.0 {
            return Err(BayesError::InvalidConfig(
                "alpha must be positive for Laplace smoothing".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.default_threshold) {
            return Err(BayesError::InvalidConfig(
                "default threshold must be between 0 and 100".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(BayesError::InvalidConfig(
                "min confidence must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct NaiveBayesFilter {
    storage: Arc<dyn BayesStorage>,
    config: BayesConfig,
    tokenizer: Tokenizer,
}

impl NaiveBayesFilter {
    pub fn new(storage: Arc<dyn BayesStorage>, config: BayesConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer = Tokenizer::new(config.tokenizer.clone());
        info!(per_chat_stats = config.per_chat_stats, "initialized naive Bayes filter");
        Ok(Self {
            storage,
            config,
            tokenizer,
        })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn scope(&self, chat_id: Option<i64>) -> Scope {
        if self.config.per_chat_stats {
            Scope::from_chat_id(chat_id)
        } else {
            Scope::Global
        }
    }

    /// Classify a message. Storage failures degrade to the neutral score:
    /// a broken model must never flag messages.
    pub fn classify(
        &self,
        text: &str,
        chat_id: Option<i64>,
        threshold: Option<f64>,
        ignore_trigrams: bool,
    ) -> SpamScore {
        let threshold = threshold.unwrap_or(self.config.default_threshold);
        let mut tokens = self.tokenizer.tokenize(text, ignore_trigrams);
        if tokens.is_empty() {
            debug!("no tokens in message, returning neutral score");
            return SpamScore::neutral();
        }
        if tokens.len() > self.config.max_tokens_per_message {
            warn!(
                tokens = tokens.len(),
                cap = self.config.max_tokens_per_message,
                "token cap exceeded, truncating"
            );
            tokens.truncate(self.config.max_tokens_per_message);
        }

        let scope = self.scope(chat_id);

        let (spam_stats, ham_stats) = match (
            self.storage.class_stats(true, scope),
            self.storage.class_stats(false, scope),
        ) {
            (Ok(s), Ok(h)) => (s, h),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to load class stats");
                return SpamScore::neutral();
            }
        };

        let total_messages = spam_stats.message_count + ham_stats.message_count;
        if total_messages == 0 {
            debug!("no training data, returning neutral score");
            return SpamScore::neutral();
        }

        // Flat priors on purpose: the training set is heavily imbalanced
        // (ham dominates), and that imbalance is handled at learning time.
        // Using observed class frequencies here would drown out the token
        // evidence.
        let mut log_p_spam = 0.5f64.ln();
        let mut log_p_ham = 0.5f64.ln();

        let vocab_size = match self.storage.vocabulary_size(scope) {
            Ok(v) => v.max(1) as f64,
            Err(e) => {
                error!(error = %e, "failed to load vocabulary size");
                1000.0
            }
        };

        let unique_tokens: HashSet<&String> = tokens.iter().collect();
        let mut token_scores = HashMap::new();
        let mut known_tokens = 0usize;

        for token in &unique_tokens {
            let stats = match self.storage.token_stats(token, scope) {
                Ok(s) => s,
                Err(e) => {
                    error!(token = %token, error = %e, "failed to load token stats");
                    continue;
                }
            };
            let stats = match stats {
                Some(s) if s.total_count >= self.config.min_token_count => s,
                _ => continue,
            };
            known_tokens += 1;

            let token_count = tokens.iter().filter(|t| t == token).count() as f64;

            let p_token_spam = (stats.spam_count as f64 + self.config.alpha)
                / (spam_stats.token_count as f64 + self.config.alpha * vocab_size);
            let p_token_ham = (stats.ham_count as f64 + self.config.alpha)
                / (ham_stats.token_count as f64 + self.config.alpha * vocab_size);

            log_p_spam += p_token_spam.ln() * token_count;
            log_p_ham += p_token_ham.ln() * token_count;

            token_scores.insert(
                (*token).clone(),
                p_token_spam / (p_token_spam + p_token_ham) * 100.0,
            );
        }

        // log-sum-exp for numerical stability.
        let max_log_p = log_p_spam.max(log_p_ham);
        let exp_spam = (log_p_spam - max_log_p).exp();
        let exp_ham = (log_p_ham - max_log_p).exp();
        let spam_probability = exp_spam / (exp_spam + exp_ham);
        let score = spam_probability * 100.0;

        let confidence = confidence(known_tokens, unique_tokens.len(), total_messages);
        let is_spam = score >= threshold && confidence >= self.config.min_confidence;

        debug!(score, confidence, is_spam, "classification result");
        SpamScore {
            score,
            is_spam,
            confidence,
            token_scores,
        }
    }

    pub fn learn_spam(&self, text: &str, chat_id: Option<i64>) -> Result<()> {
        self.learn(text, true, chat_id)
    }

    pub fn learn_ham(&self, text: &str, chat_id: Option<i64>) -> Result<()> {
        self.learn(text, false, chat_id)
    }

    fn learn(&self, text: &str, is_spam: bool, chat_id: Option<i64>) -> Result<()> {
        let tokens = self.tokenizer.tokenize(text, false);
        if tokens.is_empty() {
            warn!("no tokens in training message, skipping");
            return Err(BayesError::EmptyMessage);
        }

        let scope = self.scope(chat_id);

        self.storage
            .update_class_stats(is_spam, 1, tokens.len() as i64, scope)?;

        let mut counts: HashMap<&String, i64> = HashMap::new();
        for token in &tokens {
            *counts.entry(token).or_insert(0) += 1;
        }
        let updates: Vec<TokenUpdate> = counts
            .into_iter()
            .map(|(token, increment)| TokenUpdate {
                token: token.clone(),
                is_spam,
                increment,
            })
            .collect();
        self.storage.batch_update_tokens(&updates, scope)?;

        debug!(
            class = if is_spam { "spam" } else { "ham" },
            tokens = tokens.len(),
            scope = %scope,
            "learned message"
        );
        Ok(())
    }

    /// Learn from many messages; `progress` is invoked after each one.
    pub fn batch_learn(
        &self,
        messages: &[(String, bool, Option<i64>)],
        mut progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> BatchLearnStats {
        let mut stats = BatchLearnStats {
            total: messages.len(),
            ..Default::default()
        };

        for (i, (text, is_spam, chat_id)) in messages.iter().enumerate() {
            match self.learn(text, *is_spam, *chat_id) {
                Ok(()) => {
                    stats.success += 1;
                    if *is_spam {
                        stats.spam_learned += 1;
                    } else {
                        stats.ham_learned += 1;
                    }
                }
                Err(_) => stats.failed += 1,
            }
            if let Some(cb) = progress.as_deref_mut() {
                cb(i + 1, messages.len());
            }
        }

        info!(?stats, "batch learning completed");
        stats
    }

    pub fn model_info(&self, chat_id: Option<i64>) -> Result<ModelStats> {
        self.storage.model_stats(self.scope(chat_id))
    }

    pub fn reset(&self, chat_id: Option<i64>) -> Result<()> {
        self.storage.clear_stats(self.scope(chat_id))
    }

    pub fn cleanup_rare_tokens(&self, min_count: i64, chat_id: Option<i64>) -> Result<usize> {
        self.storage.cleanup_rare_tokens(min_count, self.scope(chat_id))
    }
}

/// Confidence combines token coverage (how much of the message the model
/// knows) with training volume, capped at 100 messages.
fn confidence(known_tokens: usize, total_tokens: usize, training_messages: i64) -> f64 {
    if total_tokens == 0 {
        return 0.0;
    }
    let token_coverage = known_tokens as f64 / total_tokens as f64;
    let training_factor = (training_messages as f64 / 100.0).min(1.0);
    (token_coverage * 0.7 + training_factor * 0.3).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBayesStorage;

    fn filter() -> NaiveBayesFilter {
        NaiveBayesFilter::new(Arc::new(MemoryBayesStorage::new()), BayesConfig::default())
            .unwrap()
    }

    #[test]
    fn untrained_model_is_neutral() {
        let filter = filter();
        let score = filter.classify("hello there friend", Some(1), None, false);
        assert_eq!(score.score, 50.0);
        assert!(!score.is_spam);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn empty_message_is_neutral_with_zero_confidence() {
        let filter = filter();
        let score = filter.classify("", Some(1), None, false);
        assert_eq!(score.score, 50.0);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn learns_and_flags_spam() {
        let filter = filter();
        for text in [
            "buy cheap deals now",
            "buy cheap pills now",
            "cheap deals buy now",
            "buy now cheap offers",
            "cheap cheap buy deals",
        ] {
            filter.learn_spam(text, Some(1)).unwrap();
        }
        for text in [
            "how are you today",
            "what about lunch today",
            "you doing well today",
            "how was your day",
            "are you coming today",
        ] {
            filter.learn_ham(text, Some(1)).unwrap();
        }

        let score = filter.classify("buy cheap now", Some(1), Some(50.0), false);
        assert!(score.score > 50.0, "score was {}", score.score);
        assert!(score.confidence >= 0.1);
        assert!(score.is_spam);

        let ham = filter.classify("how are you", Some(1), Some(50.0), false);
        assert!(ham.score < 50.0, "score was {}", ham.score);
    }

    #[test]
    fn novel_message_on_a_trained_model_is_neutral() {
        let filter = filter();
        for _ in 0..5 {
            filter.learn_spam("casino bonus stake", Some(1)).unwrap();
            filter.learn_ham("weather is nice", Some(1)).unwrap();
        }

        // No token overlap with the corpus: priors are flat, so the score
        // stays at 50 and confidence is dominated by zero coverage.
        let score = filter.classify("xylophone quartz nebula", Some(1), None, false);
        assert!((score.score - 50.0).abs() < 1e-9);
        assert!(score.confidence < 0.1);
        assert!(!score.is_spam);
    }

    #[test]
    fn symmetric_training_scores_near_fifty() {
        let filter = filter();
        filter.learn_spam("apple banana cherry", Some(1)).unwrap();
        filter.learn_ham("apple banana cherry", Some(1)).unwrap();

        let score = filter.classify("apple banana cherry", Some(1), None, false);
        assert!((score.score - 50.0).abs() < 1.0, "score was {}", score.score);
    }

    #[test]
    fn repeated_learning_does_not_decrease_spam_score() {
        let filter = filter();
        filter.learn_spam("crypto prize winner", Some(1)).unwrap();
        filter.learn_spam("crypto prize winner", Some(1)).unwrap();
        filter.learn_ham("regular chat message", Some(1)).unwrap();

        let before = filter.classify("crypto prize winner", Some(1), None, false);
        filter.learn_spam("crypto prize winner", Some(1)).unwrap();
        let after = filter.classify("crypto prize winner", Some(1), None, false);
        assert!(after.score >= before.score);
    }

    #[test]
    fn empty_training_message_fails() {
        let filter = filter();
        assert!(matches!(
            filter.learn_spam("", Some(1)),
            Err(BayesError::EmptyMessage)
        ));
    }

    #[test]
    fn per_chat_scoping_isolates_models() {
        let filter = filter();
        for _ in 0..5 {
            filter.learn_spam("casino bonus stake", Some(1)).unwrap();
            filter.learn_ham("weather is nice", Some(1)).unwrap();
        }

        // Chat 2 has no training data at all.
        let other = filter.classify("casino bonus stake", Some(2), None, false);
        assert_eq!(other.score, 50.0);
        assert_eq!(other.confidence, 0.0);
    }

    #[test]
    fn batch_learn_reports_stats() {
        let filter = filter();
        let messages = vec![
            ("buy cheap stuff".to_string(), true, Some(1)),
            ("hello friend".to_string(), false, Some(1)),
            ("".to_string(), true, Some(1)),
        ];
        let mut seen = 0;
        let stats = filter.batch_learn(&messages, Some(&mut |done, _total| seen = done));

        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.spam_learned, 1);
        assert_eq!(stats.ham_learned, 1);
        assert_eq!(seen, 3);
    }

    #[test]
    fn global_mode_ignores_chat_id() {
        let config = BayesConfig {
            per_chat_stats: false,
            ..Default::default()
        };
        let filter =
            NaiveBayesFilter::new(Arc::new(MemoryBayesStorage::new()), config).unwrap();
        for _ in 0..5 {
            filter.learn_spam("casino bonus stake", Some(1)).unwrap();
            filter.learn_ham("good morning everyone", Some(1)).unwrap();
        }

        // Learned under chat 1, but stats are global so chat 2 sees them.
        let score = filter.classify("casino bonus stake", Some(2), None, false);
        assert!(score.score > 50.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = BayesConfig {
            alpha: 0.0,
            ..Default::default()
        };
        assert!(NaiveBayesFilter::new(Arc::new(MemoryBayesStorage::new()), config).is_err());
    }
}
