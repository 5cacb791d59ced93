//! Secret masking applied to recorded traffic before persistence or any
//! consumer access.

use std::collections::HashMap;

use regex::Regex;

use crate::types::HttpCall;

pub const MASKED_PLACEHOLDER: &str = "***MASKED***";

/// Key-name patterns recognized as secret-bearing, matched
/// case-insensitively against map keys.
const DEFAULT_PATTERNS: [&str; 6] = ["api[_-]?key", "token", "auth", "password", "secret", "key"];

/// Masks secrets in HTTP calls: explicit secret strings are replaced
/// wherever they appear, and values of secret-named keys are replaced
/// wholesale. Nested JSON structures are masked recursively.
pub struct SecretMasker {
    secrets: Vec<String>,
    patterns: Vec<Regex>,
}

impl SecretMasker {
    pub fn new(secrets: Vec<String>) -> Self {
        Self::with_patterns(secrets, &DEFAULT_PATTERNS)
    }

    pub fn with_patterns(secrets: Vec<String>, patterns: &[&str]) -> Self {
        Self {
            secrets: secrets.into_iter().filter(|s| !s.is_empty()).collect(),
            patterns: patterns
                .iter()
                .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
                .collect(),
        }
    }

    /// Replace every explicit secret occurring in `text`.
    pub fn mask_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for secret in &self.secrets {
            result = result.replace(secret, MASKED_PLACEHOLDER);
        }
        result
    }

    fn is_secret_key(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.patterns.iter().any(|p| p.is_match(&key))
    }

    /// Mask a flat string map: secret-named keys lose their whole value,
    /// other values get substring masking.
    pub fn mask_map(&self, map: &HashMap<String, String>) -> HashMap<String, String> {
        map.iter()
            .map(|(key, value)| {
                let masked = if self.is_secret_key(key) {
                    MASKED_PLACEHOLDER.to_string()
                } else {
                    self.mask_text(value)
                };
                (key.clone(), masked)
            })
            .collect()
    }

    /// Recursively mask a JSON value.
    pub fn mask_json(&self, value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => serde_json::Value::String(self.mask_text(s)),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| self.mask_json(v)).collect())
            }
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, v)| {
                        let masked = if self.is_secret_key(key) {
                            serde_json::Value::String(MASKED_PLACEHOLDER.to_string())
                        } else {
                            self.mask_json(v)
                        };
                        (key.clone(), masked)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Mask both halves of an HTTP call. Request bodies that parse as JSON
    /// are masked structurally so secret-named fields disappear even when
    /// the raw secret value is unknown.
    pub fn mask_call(&self, call: &HttpCall) -> HttpCall {
        let mut masked = call.clone();

        masked.request.url = self.mask_text(&call.request.url);
        masked.request.headers = self.mask_map(&call.request.headers);
        masked.request.params = self.mask_map(&call.request.params);
        masked.request.body = call.request.body.as_ref().map(|body| {
            match serde_json::from_str::<serde_json::Value>(body) {
                Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                    self.mask_json(&value).to_string()
                }
                _ => self.mask_text(body),
            }
        });

        masked.response.headers = self.mask_map(&call.response.headers);
        masked.response.content = self.mask_text(&call.response.content);

        masked
    }
}
