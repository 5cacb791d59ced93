use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::db::init_db;
use crate::error::Result;
use crate::storage::{BayesStorage, TokenUpdate};
use crate::types::{ClassStats, ModelStats, Scope, TokenStats};

/// Persistent Bayes storage. Single-row updates are atomic; batch updates
/// run in one transaction.
pub struct SqliteBayesStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBayesStorage {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = conn.lock().unwrap();
            init_db(&conn)?;
        }
        Ok(Self { conn })
    }

    fn bump_token(
        conn: &Connection,
        token: &str,
        is_spam: bool,
        increment: i64,
        chat_id: Option<i64>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let spam_inc = if is_spam { increment } else { 0 };
        let ham_inc = if is_spam { 0 } else { increment };

        let updated = conn.execute(
            "UPDATE bayes_tokens
             SET spam_count = spam_count + ?1,
                 ham_count = ham_count + ?2,
                 total_count = total_count + ?3,
                 updated_at = ?4
             WHERE token = ?5
               AND ((?6 IS NULL AND chat_id IS NULL) OR chat_id = ?6)",
            rusqlite::params![spam_inc, ham_inc, increment, now, token, chat_id],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO bayes_tokens
                 (token, chat_id, spam_count, ham_count, total_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![token, chat_id, spam_inc, ham_inc, increment, now],
            )?;
        }
        Ok(())
    }
}

impl BayesStorage for SqliteBayesStorage {
    fn token_stats(&self, token: &str, scope: Scope) -> Result<Option<TokenStats>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT token, spam_count, ham_count, total_count
                 FROM bayes_tokens
                 WHERE token = ?1
                   AND ((?2 IS NULL AND chat_id IS NULL) OR chat_id = ?2)",
                rusqlite::params![token, scope.chat_id()],
                |row| {
                    Ok(TokenStats {
                        token: row.get(0)?,
                        spam_count: row.get(1)?,
                        ham_count: row.get(2)?,
                        total_count: row.get(3)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }

    fn class_stats(&self, is_spam: bool, scope: Scope) -> Result<ClassStats> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT message_count, token_count
                 FROM bayes_classes
                 WHERE is_spam = ?1
                   AND ((?2 IS NULL AND chat_id IS NULL) OR chat_id = ?2)",
                rusqlite::params![is_spam, scope.chat_id()],
                |row| {
                    Ok(ClassStats {
                        message_count: row.get(0)?,
                        token_count: row.get(1)?,
                    })
                },
            )
            .ok();
        Ok(row.unwrap_or_default())
    }

    fn update_token_stats(
        &self,
        token: &str,
        is_spam: bool,
        increment: i64,
        scope: Scope,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::bump_token(&conn, token, is_spam, increment, scope.chat_id())
    }

    fn update_class_stats(
        &self,
        is_spam: bool,
        message_increment: i64,
        token_increment: i64,
        scope: Scope,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let chat_id = scope.chat_id();

        let updated = conn.execute(
            "UPDATE bayes_classes
             SET message_count = message_count + ?1,
                 token_count = token_count + ?2,
                 updated_at = ?3
             WHERE is_spam = ?4
               AND ((?5 IS NULL AND chat_id IS NULL) OR chat_id = ?5)",
            rusqlite::params![message_increment, token_increment, now, is_spam, chat_id],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO bayes_classes
                 (chat_id, is_spam, message_count, token_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![chat_id, is_spam, message_increment, token_increment, now],
            )?;
        }
        Ok(())
    }

    fn batch_update_tokens(&self, updates: &[TokenUpdate], scope: Scope) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for update in updates {
            Self::bump_token(
                &tx,
                &update.token,
                update.is_spam,
                update.increment,
                scope.chat_id(),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn vocabulary_size(&self, scope: Scope) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let size = conn.query_row(
            "SELECT COUNT(*) FROM bayes_tokens
             WHERE ((?1 IS NULL AND chat_id IS NULL) OR chat_id = ?1)",
            [scope.chat_id()],
            |row| row.get(0),
        )?;
        Ok(size)
    }

    fn model_stats(&self, scope: Scope) -> Result<ModelStats> {
        let (spam_messages, ham_messages, total_tokens) = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN is_spam = 1 THEN message_count ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_spam = 0 THEN message_count ELSE 0 END), 0),
                    COALESCE(SUM(token_count), 0)
                 FROM bayes_classes
                 WHERE ((?1 IS NULL AND chat_id IS NULL) OR chat_id = ?1)",
                [scope.chat_id()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?
        };
        Ok(ModelStats {
            spam_messages,
            ham_messages,
            total_tokens,
            vocabulary_size: self.vocabulary_size(scope)?,
            chat_id: scope.chat_id(),
        })
    }

    fn clear_stats(&self, scope: Scope) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let chat_id = scope.chat_id();
        conn.execute(
            "DELETE FROM bayes_tokens
             WHERE ((?1 IS NULL AND chat_id IS NULL) OR chat_id = ?1)",
            [chat_id],
        )?;
        conn.execute(
            "DELETE FROM bayes_classes
             WHERE ((?1 IS NULL AND chat_id IS NULL) OR chat_id = ?1)",
            [chat_id],
        )?;
        info!(scope = %scope, "cleared Bayes statistics");
        Ok(())
    }

    fn top_spam_tokens(&self, limit: usize, scope: Scope) -> Result<Vec<TokenStats>> {
        self.top_tokens(limit, scope, true)
    }

    fn top_ham_tokens(&self, limit: usize, scope: Scope) -> Result<Vec<TokenStats>> {
        self.top_tokens(limit, scope, false)
    }

    fn cleanup_rare_tokens(&self, min_count: i64, scope: Scope) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM bayes_tokens
             WHERE total_count < ?1
               AND ((?2 IS NULL AND chat_id IS NULL) OR chat_id = ?2)",
            rusqlite::params![min_count, scope.chat_id()],
        )?;
        info!(removed, min_count, scope = %scope, "cleaned up rare tokens");
        Ok(removed)
    }
}

impl SqliteBayesStorage {
    fn top_tokens(&self, limit: usize, scope: Scope, spam: bool) -> Result<Vec<TokenStats>> {
        let column = if spam { "spam_count" } else { "ham_count" };
        let sql = format!(
            "SELECT token, spam_count, ham_count, total_count,
                    CAST({column} AS REAL) / CAST(total_count AS REAL) AS ratio
             FROM bayes_tokens
             WHERE total_count >= 2
               AND ((?1 IS NULL AND chat_id IS NULL) OR chat_id = ?1)
             ORDER BY ratio DESC, {column} DESC
             LIMIT ?2"
        );
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params![scope.chat_id(), limit], |row| {
                Ok(TokenStats {
                    token: row.get(0)?,
                    spam_count: row.get(1)?,
                    ham_count: row.get(2)?,
                    total_count: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SqliteBayesStorage {
        let conn = Connection::open_in_memory().unwrap();
        SqliteBayesStorage::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn token_counters_accumulate() {
        let storage = storage();
        let scope = Scope::Chat(42);
        storage.update_token_stats("deal", true, 2, scope).unwrap();
        storage.update_token_stats("deal", false, 1, scope).unwrap();

        let stats = storage.token_stats("deal", scope).unwrap().unwrap();
        assert_eq!(stats.spam_count, 2);
        assert_eq!(stats.ham_count, 1);
        assert_eq!(stats.total_count, 3);
    }

    #[test]
    fn global_and_chat_rows_are_distinct() {
        let storage = storage();
        storage
            .update_token_stats("deal", true, 1, Scope::Global)
            .unwrap();
        storage
            .update_token_stats("deal", true, 5, Scope::Chat(7))
            .unwrap();

        // Repeated global updates must hit the same row, not insert
        // duplicates (NULL chat_id is matched explicitly).
        storage
            .update_token_stats("deal", true, 1, Scope::Global)
            .unwrap();

        assert_eq!(storage.vocabulary_size(Scope::Global).unwrap(), 1);
        let global = storage.token_stats("deal", Scope::Global).unwrap().unwrap();
        assert_eq!(global.spam_count, 2);
        let chat = storage.token_stats("deal", Scope::Chat(7)).unwrap().unwrap();
        assert_eq!(chat.spam_count, 5);
    }

    #[test]
    fn batch_update_is_applied_fully() {
        let storage = storage();
        let scope = Scope::Chat(1);
        let updates = vec![
            TokenUpdate {
                token: "buy".to_string(),
                is_spam: true,
                increment: 2,
            },
            TokenUpdate {
                token: "cheap".to_string(),
                is_spam: true,
                increment: 1,
            },
        ];
        storage.batch_update_tokens(&updates, scope).unwrap();
        assert_eq!(storage.vocabulary_size(scope).unwrap(), 2);
        assert_eq!(
            storage.token_stats("buy", scope).unwrap().unwrap().spam_count,
            2
        );
    }

    #[test]
    fn model_stats_aggregate_classes() {
        let storage = storage();
        let scope = Scope::Chat(5);
        storage.update_class_stats(true, 3, 30, scope).unwrap();
        storage.update_class_stats(false, 7, 70, scope).unwrap();

        let stats = storage.model_stats(scope).unwrap();
        assert_eq!(stats.spam_messages, 3);
        assert_eq!(stats.ham_messages, 7);
        assert_eq!(stats.total_tokens, 100);
        assert_eq!(stats.total_messages(), 10);
    }

    #[test]
    fn clear_stats_resets_scope() {
        let storage = storage();
        let scope = Scope::Chat(5);
        storage.update_class_stats(true, 1, 10, scope).unwrap();
        storage.update_token_stats("x1", true, 1, scope).unwrap();
        storage.clear_stats(scope).unwrap();

        assert_eq!(storage.vocabulary_size(scope).unwrap(), 0);
        assert_eq!(storage.class_stats(true, scope).unwrap(), ClassStats::default());
    }
}
