//! Built-in key generators: identity for strings, SHA-512 over the debug
//! representation, and canonical-JSON (optionally hashed).

use serde::Serialize;
use sha2::{Digest, Sha512};

use crate::error::CacheError;

/// Maps arbitrary inputs to stable string cache keys.
pub trait KeyGen<K>: Send + Sync {
    fn generate(&self, key: &K) -> Result<String, CacheError>;
}

/// Pass-through generator for keys that are already strings. Non-string
/// inputs are rejected at the type level.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringKeyGen;

impl KeyGen<String> for StringKeyGen {
    fn generate(&self, key: &String) -> Result<String, CacheError> {
        Ok(key.clone())
    }
}

/// SHA-512 hex over the value's debug representation. Tolerates any input;
/// logically equal values with different representations hash differently.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashKeyGen;

impl<K: std::fmt::Debug> KeyGen<K> for HashKeyGen {
    fn generate(&self, key: &K) -> Result<String, CacheError> {
        Ok(sha512_hex(&format!("{key:?}")))
    }
}

/// Canonical-JSON key generator. With `sort_keys` (default) map keys are
/// serialized in sorted order so logically equal inputs produce equal keys;
/// with `hash` (default) the JSON is reduced to a SHA-512 hex digest.
#[derive(Debug, Clone, Copy)]
pub struct JsonKeyGen {
    pub sort_keys: bool,
    pub hash: bool,
}

impl Default for JsonKeyGen {
    fn default() -> Self {
        Self {
            sort_keys: true,
            hash: true,
        }
    }
}

impl JsonKeyGen {
    pub fn plain() -> Self {
        Self {
            sort_keys: true,
            hash: false,
        }
    }
}

impl<K: Serialize> KeyGen<K> for JsonKeyGen {
    fn generate(&self, key: &K) -> Result<String, CacheError> {
        let json = if self.sort_keys {
            // serde_json's Value object is a BTreeMap, so a round-trip
            // through Value yields sorted keys.
            let value = serde_json::to_value(key)?;
            serde_json::to_string(&value)?
        } else {
            serde_json::to_string(key)?
        };

        if self.hash {
            Ok(sha512_hex(&json))
        } else {
            Ok(json)
        }
    }
}

fn sha512_hex(input: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
