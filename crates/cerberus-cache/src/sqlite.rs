use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::codec::ValueCodec;
use crate::error::CacheError;
use crate::keygen::KeyGen;
use crate::{is_expired, Cache, CacheStats};

/// Persistent cache namespace backed by the shared `cache_entries` table.
///
/// Rows upsert on (namespace, key); TTL is evaluated at read time from
/// `updated_at`; `clear` deletes all rows of this namespace. Several
/// namespaces share one connection.
pub struct SqliteCache<K, V> {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
    keygen: Box<dyn KeyGen<K>>,
    codec: Box<dyn ValueCodec<V>>,
    default_ttl: i64,
    max_size: usize,
}

impl<K, V> SqliteCache<K, V> {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        namespace: impl Into<String>,
        keygen: Box<dyn KeyGen<K>>,
        codec: Box<dyn ValueCodec<V>>,
        default_ttl: i64,
        max_size: usize,
    ) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
            keygen,
            codec,
            default_ttl,
            max_size,
        }
    }

    fn get_inner(&self, key: &K, ttl: Option<i64>) -> Result<Option<V>, CacheError> {
        let string_key = self.keygen.generate(key)?;
        let effective_ttl = ttl.unwrap_or(self.default_ttl);

        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT data, updated_at FROM cache_entries
                 WHERE namespace = ?1 AND key = ?2",
                rusqlite::params![self.namespace, string_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let (data, updated_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let age = DateTime::parse_from_rfc3339(&updated_at)
            .map(|ts| Utc::now().signed_duration_since(ts).num_seconds())
            .unwrap_or(i64::MAX);
        if is_expired(age, effective_ttl) {
            conn.execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                rusqlite::params![self.namespace, string_key],
            )?;
            return Ok(None);
        }

        Ok(Some(self.codec.decode(&data)?))
    }

    fn set_inner(&self, key: &K, value: &V) -> Result<(), CacheError> {
        let string_key = self.keygen.generate(key)?;
        let data = self.codec.encode(value)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cache_entries (namespace, key, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(namespace, key)
             DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            rusqlite::params![self.namespace, string_key, data, now],
        )?;

        // Enforce the size bound: oldest created_at first, ties by key.
        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
            [&self.namespace],
            |row| row.get(0),
        )?;
        if count > self.max_size {
            let excess = count - self.max_size;
            conn.execute(
                "DELETE FROM cache_entries
                 WHERE namespace = ?1 AND key IN (
                     SELECT key FROM cache_entries WHERE namespace = ?1
                     ORDER BY created_at, key LIMIT ?2
                 )",
                rusqlite::params![self.namespace, excess],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for SqliteCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    async fn get(&self, key: &K, ttl: Option<i64>) -> Option<V> {
        match self.get_inner(key, ttl) {
            Ok(value) => value,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "cache get failed");
                None
            }
        }
    }

    async fn set(&self, key: &K, value: &V) -> bool {
        match self.set_inner(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "cache set failed");
                false
            }
        }
    }

    async fn clear(&self) {
        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            [&self.namespace],
        ) {
            warn!(namespace = %self.namespace, error = %e, "cache clear failed");
        }
    }

    fn stats(&self) -> CacheStats {
        let conn = self.conn.lock().unwrap();
        let entries = conn
            .query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                [&self.namespace],
                |row| row.get(0),
            )
            .unwrap_or(0);
        CacheStats {
            enabled: true,
            entries,
            max_size: self.max_size,
            default_ttl: self.default_ttl,
        }
    }
}
