use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tracing::debug;

use cerberus_core::{MessageCategory, SpamReason};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{ChatMessage, ChatUser, SpamMessage};

/// Chat users, the message log, and the spam/ham exemplar stores.
///
/// Thread-safe: all operations are single SQLite statements (or explicit
/// transactions) behind a shared connection mutex.
pub struct ChatStore {
    conn: Arc<Mutex<Connection>>,
}

impl ChatStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = conn.lock().unwrap();
            init_db(&conn)?;
        }
        Ok(Self { conn })
    }

    /// Record one observed message: upserts the user (bumping
    /// `messages_count`) and appends to the message log.
    pub fn record_message(
        &self,
        chat_id: i64,
        user_id: i64,
        username: &str,
        full_name: &str,
        message_id: i64,
        text: &str,
        category: MessageCategory,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE chat_users
             SET messages_count = messages_count + 1,
                 username = ?3, full_name = ?4, updated_at = ?5
             WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![chat_id, user_id, username, full_name, now],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO chat_users
                 (chat_id, user_id, username, full_name, messages_count,
                  is_spammer, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, 0, '{}', ?5, ?5)",
                rusqlite::params![chat_id, user_id, username, full_name, now],
            )?;
        }

        tx.execute(
            "INSERT INTO chat_messages
             (chat_id, user_id, message_id, message_text, category, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![chat_id, user_id, message_id, text, category.as_str(), now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Make sure a user row exists without touching its message count.
    pub fn ensure_user(
        &self,
        chat_id: i64,
        user_id: i64,
        username: &str,
        full_name: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO chat_users
             (chat_id, user_id, username, full_name, messages_count,
              is_spammer, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, '{}', ?5, ?5)",
            rusqlite::params![chat_id, user_id, username, full_name, now],
        )?;
        Ok(())
    }

    pub fn chat_user(&self, chat_id: i64, user_id: i64) -> Result<Option<ChatUser>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT chat_id, user_id, username, full_name, messages_count,
                        is_spammer, metadata, created_at, updated_at
                 FROM chat_users WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
                row_to_user,
            )
            .ok();
        Ok(row)
    }

    /// Look up a chat member by username; a leading `@` is tolerated.
    pub fn chat_user_by_username(&self, chat_id: i64, username: &str) -> Result<Option<ChatUser>> {
        let username = username.strip_prefix('@').unwrap_or(username);
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT chat_id, user_id, username, full_name, messages_count,
                        is_spammer, metadata, created_at, updated_at
                 FROM chat_users WHERE chat_id = ?1 AND username = ?2",
                rusqlite::params![chat_id, username],
                row_to_user,
            )
            .ok();
        Ok(row)
    }

    pub fn set_user_spammer(&self, chat_id: i64, user_id: i64, is_spammer: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE chat_users SET is_spammer = ?3, updated_at = ?4
             WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![chat_id, user_id, is_spammer, now],
        )?;
        if updated == 0 {
            return Err(StoreError::UserNotFound { chat_id, user_id });
        }
        debug!(chat_id, user_id, is_spammer, "updated spammer flag");
        Ok(())
    }

    pub fn set_user_metadata(
        &self,
        chat_id: i64,
        user_id: i64,
        metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE chat_users SET metadata = ?3, updated_at = ?4
             WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![chat_id, user_id, json, now],
        )?;
        if updated == 0 {
            return Err(StoreError::UserNotFound { chat_id, user_id });
        }
        Ok(())
    }

    /// Last `limit` messages of a user in a chat, newest first
    /// (descending message id).
    pub fn chat_messages_by_user(
        &self,
        chat_id: i64,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, message_id, message_text, category, created_at
             FROM chat_messages
             WHERE chat_id = ?1 AND user_id = ?2
             ORDER BY message_id DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![chat_id, user_id, limit], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Recent user-authored messages of a chat, newest first. Used for
    /// Bayes pretraining.
    pub fn recent_user_messages(&self, chat_id: i64, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, message_id, message_text, category, created_at
             FROM chat_messages
             WHERE chat_id = ?1 AND category = ?2
             ORDER BY message_id DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![chat_id, MessageCategory::User.as_str(), limit],
                row_to_message,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn add_spam_message(
        &self,
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        text: &str,
        reason: SpamReason,
        score: f64,
    ) -> Result<()> {
        self.add_exemplar("spam_messages", chat_id, user_id, message_id, text, reason, score)
    }

    pub fn add_ham_message(
        &self,
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        text: &str,
        reason: SpamReason,
        score: f64,
    ) -> Result<()> {
        self.add_exemplar("ham_messages", chat_id, user_id, message_id, text, reason, score)
    }

    fn add_exemplar(
        &self,
        table: &str,
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        text: &str,
        reason: SpamReason,
        score: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            &format!(
                "INSERT INTO {table}
                 (chat_id, user_id, message_id, message_text, reason, score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            rusqlite::params![chat_id, user_id, message_id, text, reason.as_str(), score, now],
        )?;
        Ok(())
    }

    /// All stored spam exemplars sharing this exact text.
    pub fn spam_messages_by_text(&self, text: &str) -> Result<Vec<SpamMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, message_id, message_text, reason, score, created_at
             FROM spam_messages WHERE message_text = ?1",
        )?;
        let rows = stmt
            .query_map([text], row_to_exemplar)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn spam_messages_by_user(&self, chat_id: i64, user_id: i64) -> Result<Vec<SpamMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, message_id, message_text, reason, score, created_at
             FROM spam_messages WHERE chat_id = ?1 AND user_id = ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![chat_id, user_id], row_to_exemplar)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn delete_spam_messages_by_user(&self, chat_id: i64, user_id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM spam_messages WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![chat_id, user_id],
        )?;
        Ok(deleted)
    }

    pub fn spam_messages(&self, limit: usize) -> Result<Vec<SpamMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, message_id, message_text, reason, score, created_at
             FROM spam_messages ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], row_to_exemplar)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn ham_messages_by_user(&self, chat_id: i64, user_id: i64) -> Result<Vec<SpamMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, message_id, message_text, reason, score, created_at
             FROM ham_messages WHERE chat_id = ?1 AND user_id = ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![chat_id, user_id], row_to_exemplar)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatUser> {
    let metadata_json: String = row.get(6)?;
    Ok(ChatUser {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        full_name: row.get(3)?,
        messages_count: row.get(4)?,
        is_spammer: row.get(5)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let category_str: String = row.get(4)?;
    Ok(ChatMessage {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        message_id: row.get(2)?,
        message_text: row.get(3)?,
        category: category_str.parse().unwrap_or(MessageCategory::User),
        created_at: row.get(5)?,
    })
}

fn row_to_exemplar(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpamMessage> {
    let reason_str: String = row.get(4)?;
    Ok(SpamMessage {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        message_id: row.get(2)?,
        message_text: row.get(3)?,
        reason: reason_str.parse().unwrap_or(SpamReason::Auto),
        score: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChatStore {
        let conn = Connection::open_in_memory().unwrap();
        ChatStore::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn recording_messages_bumps_user_count() {
        let store = store();
        for message_id in 1..=3 {
            store
                .record_message(-100, 7, "alice", "Alice", message_id, "hi", MessageCategory::User)
                .unwrap();
        }
        let user = store.chat_user(-100, 7).unwrap().unwrap();
        assert_eq!(user.messages_count, 3);
        assert!(!user.is_spammer);
    }

    #[test]
    fn last_messages_are_newest_first_by_message_id() {
        let store = store();
        for message_id in [5, 2, 9, 1] {
            store
                .record_message(-100, 7, "alice", "Alice", message_id, "text", MessageCategory::User)
                .unwrap();
        }
        let messages = store.chat_messages_by_user(-100, 7, 3).unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![9, 5, 2]);
    }

    #[test]
    fn username_lookup_tolerates_at_prefix() {
        let store = store();
        store
            .record_message(-100, 7, "alice", "Alice", 1, "hi", MessageCategory::User)
            .unwrap();
        assert!(store.chat_user_by_username(-100, "@alice").unwrap().is_some());
        assert!(store.chat_user_by_username(-100, "alice").unwrap().is_some());
        assert!(store.chat_user_by_username(-100, "bob").unwrap().is_none());
    }

    #[test]
    fn metadata_round_trips() {
        let store = store();
        store
            .record_message(-100, 7, "alice", "Alice", 1, "hi", MessageCategory::User)
            .unwrap();
        let mut metadata = HashMap::new();
        metadata.insert("notSpammer".to_string(), "true".to_string());
        store.set_user_metadata(-100, 7, &metadata).unwrap();

        let user = store.chat_user(-100, 7).unwrap().unwrap();
        assert!(user.not_spammer());
    }

    #[test]
    fn spammer_flag_requires_existing_user() {
        let store = store();
        assert!(matches!(
            store.set_user_spammer(-100, 7, true),
            Err(StoreError::UserNotFound { .. })
        ));
    }

    #[test]
    fn spam_exemplars_found_by_exact_text() {
        let store = store();
        store
            .add_spam_message(-100, 7, 1, "Buy cheap deals!", SpamReason::Auto, 100.0)
            .unwrap();
        store
            .add_spam_message(-200, 8, 2, "Buy cheap deals!", SpamReason::Admin, 100.0)
            .unwrap();

        assert_eq!(store.spam_messages_by_text("Buy cheap deals!").unwrap().len(), 2);
        assert!(store.spam_messages_by_text("something else").unwrap().is_empty());
    }

    #[test]
    fn user_spam_exemplars_can_be_migrated() {
        let store = store();
        store
            .add_spam_message(-100, 7, 1, "spam one", SpamReason::Auto, 80.0)
            .unwrap();
        store
            .add_spam_message(-100, 7, 2, "spam two", SpamReason::Auto, 90.0)
            .unwrap();

        let spam = store.spam_messages_by_user(-100, 7).unwrap();
        assert_eq!(spam.len(), 2);

        store.delete_spam_messages_by_user(-100, 7).unwrap();
        for message in &spam {
            store
                .add_ham_message(
                    message.chat_id,
                    message.user_id,
                    message.message_id,
                    &message.message_text,
                    SpamReason::Unban,
                    message.score,
                )
                .unwrap();
        }

        assert!(store.spam_messages_by_user(-100, 7).unwrap().is_empty());
        let ham = store.ham_messages_by_user(-100, 7).unwrap();
        assert_eq!(ham.len(), 2);
        assert!(ham.iter().all(|m| m.reason == SpamReason::Unban));
    }
}
