use std::marker::PhantomData;

use async_trait::async_trait;

use crate::{Cache, CacheStats};

/// No-op cache: every get misses, every set pretends to succeed. Valid
/// wherever a [`Cache`] is expected; used to disable caching without
/// touching call sites.
pub struct NullCache<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> NullCache<K, V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> Default for NullCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for NullCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    async fn get(&self, _key: &K, _ttl: Option<i64>) -> Option<V> {
        None
    }

    async fn set(&self, _key: &K, _value: &V) -> bool {
        true
    }

    async fn clear(&self) {}

    fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: false,
            entries: 0,
            max_size: 0,
            default_ttl: 0,
        }
    }
}
