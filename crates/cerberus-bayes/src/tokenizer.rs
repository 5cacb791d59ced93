//! Text tokenization for the Bayes filter: strip noise, normalize, extract
//! words, filter by length and stopwords, emit n-grams. Handles Russian and
//! English text.

use std::collections::HashSet;

use regex::Regex;

/// Default stopword set: common Russian and English function words.
fn default_stopwords() -> HashSet<String> {
    [
        // Russian
        "и", "в", "не", "на", "я", "что", "с", "а", "как", "это", "он", "она", "они", "мы",
        "вы", "ты", "к", "по", "из", "за", "от", "до", "при", "для", "или", "но", "да", "нет",
        "все", "так", "уже", "еще", "там", "тут", "где", "когда", "если",
        // English
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
        "by", "from", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
        "does", "did", "will", "would", "could", "should", "may", "might", "can", "this",
        "that", "these", "those", "i", "you", "he", "she", "it", "we", "they",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Inclusive bounds on token character length.
    pub min_token_length: usize,
    pub max_token_length: usize,
    pub lowercase: bool,
    pub remove_urls: bool,
    pub remove_mentions: bool,
    pub remove_numbers: bool,
    pub remove_emoji: bool,
    /// Include adjacent word pairs joined with `_`.
    pub use_bigrams: bool,
    /// Include word triplets joined with `_`.
    pub use_trigrams: bool,
    pub stopwords: Option<HashSet<String>>,
    /// Keep punctuation attached by splitting on whitespace instead of
    /// extracting word characters.
    pub preserve_punctuation: bool,
    pub normalize_whitespace: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 2,
            max_token_length: 50,
            lowercase: true,
            remove_urls: true,
            remove_mentions: true,
            remove_numbers: false,
            remove_emoji: false,
            use_bigrams: true,
            use_trigrams: false,
            stopwords: None,
            preserve_punctuation: false,
            normalize_whitespace: true,
        }
    }
}

/// Raw-text spam indicators consumed by the decision engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SpamIndicators {
    pub url_count: usize,
    pub mention_count: usize,
    pub number_count: usize,
    pub emoji_count: usize,
    pub caps_ratio: f64,
    pub exclamation_count: usize,
    pub question_count: usize,
    pub length: usize,
    pub word_count: usize,
}

pub struct Tokenizer {
    config: TokenizerConfig,
    stopwords: HashSet<String>,
    url_pattern: Regex,
    mention_pattern: Regex,
    number_pattern: Regex,
    emoji_pattern: Regex,
    word_pattern: Regex,
    whitespace_pattern: Regex,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let stopwords = config.stopwords.clone().unwrap_or_else(default_stopwords);
        Self {
            stopwords,
            config,
            url_pattern: Regex::new(r"https?://\S+|www\.\S+|t\.me/\S+").unwrap(),
            mention_pattern: Regex::new(r"@\w+").unwrap(),
            number_pattern: Regex::new(r"\d+").unwrap(),
            emoji_pattern: Regex::new(
                "[\u{1F600}-\u{1F64F}\u{1F300}-\u{1F5FF}\u{1F680}-\u{1F6FF}\
                 \u{1F1E0}-\u{1F1FF}\u{2702}-\u{27B0}\u{24C2}-\u{1F251}]",
            )
            .unwrap(),
            word_pattern: Regex::new(r"\b\w+\b").unwrap(),
            whitespace_pattern: Regex::new(r"\s+").unwrap(),
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Convert text into a token list (unigrams, then bigrams/trigrams when
    /// enabled). The output may contain duplicates; callers decide whether
    /// to deduplicate.
    pub fn tokenize(&self, text: &str, ignore_trigrams: bool) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let processed = self.preprocess(text);
        let words = self.extract_words(&processed);
        let filtered = self.filter_words(words);
        self.generate_ngrams(filtered, ignore_trigrams)
    }

    fn preprocess(&self, text: &str) -> String {
        let mut processed = text.to_string();

        if self.config.remove_urls {
            processed = self.url_pattern.replace_all(&processed, "").into_owned();
        }
        if self.config.remove_mentions {
            processed = self.mention_pattern.replace_all(&processed, "").into_owned();
        }
        if self.config.remove_numbers {
            processed = self.number_pattern.replace_all(&processed, "").into_owned();
        }
        if self.config.remove_emoji {
            processed = self.emoji_pattern.replace_all(&processed, "").into_owned();
        }
        if self.config.normalize_whitespace {
            processed = self.whitespace_pattern.replace_all(&processed, " ").into_owned();
        }
        if self.config.lowercase {
            processed = processed.to_lowercase();
        }

        processed.trim().to_string()
    }

    fn extract_words(&self, text: &str) -> Vec<String> {
        if self.config.preserve_punctuation {
            text.split_whitespace().map(str::to_string).collect()
        } else {
            self.word_pattern
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect()
        }
    }

    fn filter_words(&self, words: Vec<String>) -> Vec<String> {
        words
            .into_iter()
            .filter(|word| {
                let len = word.chars().count();
                len >= self.config.min_token_length && len <= self.config.max_token_length
            })
            .filter(|word| !self.stopwords.contains(&word.to_lowercase()))
            .collect()
    }

    fn generate_ngrams(&self, words: Vec<String>, ignore_trigrams: bool) -> Vec<String> {
        let mut tokens = words.clone();

        if self.config.use_bigrams && words.len() > 1 {
            for pair in words.windows(2) {
                tokens.push(format!("{}_{}", pair[0], pair[1]));
            }
        }
        if self.config.use_trigrams && !ignore_trigrams && words.len() > 2 {
            for triple in words.windows(3) {
                tokens.push(format!("{}_{}_{}", triple[0], triple[1], triple[2]));
            }
        }

        tokens
    }

    /// Token → frequency map for a text.
    pub fn token_frequencies(&self, text: &str) -> std::collections::HashMap<String, usize> {
        let mut freqs = std::collections::HashMap::new();
        for token in self.tokenize(text, false) {
            *freqs.entry(token).or_insert(0) += 1;
        }
        freqs
    }

    /// Heuristic indicators computed from the raw (unprocessed) text.
    pub fn spam_indicators(&self, text: &str) -> SpamIndicators {
        SpamIndicators {
            url_count: self.url_pattern.find_iter(text).count(),
            mention_count: self.mention_pattern.find_iter(text).count(),
            number_count: self.number_pattern.find_iter(text).count(),
            emoji_count: self.emoji_pattern.find_iter(text).count(),
            caps_ratio: caps_ratio(text),
            exclamation_count: text.matches('!').count(),
            question_count: text.matches('?').count(),
            length: text.chars().count(),
            word_count: text.split_whitespace().count(),
        }
    }

    /// Configuration sanity check; returns the list of problems found.
    pub fn validate_config(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.config.min_token_length < 1 {
            errors.push("min_token_length must be at least 1".to_string());
        }
        if self.config.max_token_length < self.config.min_token_length {
            errors.push("max_token_length must be >= min_token_length".to_string());
        }
        if self.config.max_token_length > 100 {
            errors.push("max_token_length should not exceed 100".to_string());
        }
        errors
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

fn caps_ratio(text: &str) -> f64 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    let caps = letters.iter().filter(|c| c.is_uppercase()).count();
    caps as f64 / letters.len() as f64
}
