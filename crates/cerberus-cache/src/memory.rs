use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::keygen::KeyGen;
use crate::{is_expired, Cache, CacheStats};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: DateTime<Utc>,
}

/// In-memory cache used for tests and ephemeral namespaces. A single mutex
/// guards the map; eviction runs inside the write critical section.
pub struct MemoryCache<K, V> {
    keygen: Box<dyn KeyGen<K>>,
    entries: Mutex<HashMap<String, Entry<V>>>,
    default_ttl: i64,
    max_size: usize,
}

impl<K, V> MemoryCache<K, V> {
    pub fn new(keygen: Box<dyn KeyGen<K>>, default_ttl: i64, max_size: usize) -> Self {
        Self {
            keygen,
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            max_size,
        }
    }

    #[cfg(test)]
    fn backdate(&self, string_key: &str, seconds: i64) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(string_key) {
            entry.created_at = entry.created_at - chrono::Duration::seconds(seconds);
        }
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K, ttl: Option<i64>) -> Option<V> {
        let string_key = match self.keygen.generate(key) {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "cache key generation failed");
                return None;
            }
        };

        let effective_ttl = ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get(&string_key)?;
        let age = Utc::now()
            .signed_duration_since(entry.created_at)
            .num_seconds();
        if is_expired(age, effective_ttl) {
            entries.remove(&string_key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &K, value: &V) -> bool {
        let string_key = match self.keygen.generate(key) {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "cache key generation failed");
                return false;
            }
        };

        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            string_key,
            Entry {
                value: value.clone(),
                created_at: Utc::now(),
            },
        );

        // Evict oldest entries (ties broken by key) until within bounds.
        while entries.len() > self.max_size {
            let victim = entries
                .iter()
                .min_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then(ka.cmp(kb)))
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
        true
    }

    async fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: true,
            entries: self.entries.lock().unwrap().len(),
            max_size: self.max_size,
            default_ttl: self.default_ttl,
        }
    }
}
