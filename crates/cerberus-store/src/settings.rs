use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tracing::debug;

use cerberus_core::{ChatSettings, ChatSettingsKey, ChatSettingsValue};

use crate::db::init_db;
use crate::error::Result;

/// Per-chat settings overrides. Defaults live in
/// [`ChatSettingsKey::default_value`]; only overrides are persisted.
/// Writes are atomic and visible to subsequent snapshot loads.
pub struct SettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SettingsStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = conn.lock().unwrap();
            init_db(&conn)?;
        }
        Ok(Self { conn })
    }

    /// Load a consistent settings snapshot for one chat. Unknown keys left
    /// behind by older versions are skipped.
    pub fn chat_settings(&self, chat_id: i64) -> Result<ChatSettings> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value FROM chat_settings WHERE chat_id = ?1")?;
        let mut overrides = HashMap::new();
        let rows = stmt.query_map([chat_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            let (key, value) = row;
            if let Ok(key) = key.parse::<ChatSettingsKey>() {
                overrides.insert(key, ChatSettingsValue::new(value));
            }
        }
        Ok(ChatSettings::new(overrides))
    }

    pub fn set(&self, chat_id: i64, key: ChatSettingsKey, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chat_settings (chat_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id, key)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![chat_id, key.as_str(), value, now],
        )?;
        debug!(chat_id, key = key.as_str(), value, "chat setting updated");
        Ok(())
    }

    /// Drop an override, reverting the key to its default.
    pub fn unset(&self, chat_id: i64, key: ChatSettingsKey) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM chat_settings WHERE chat_id = ?1 AND key = ?2",
            rusqlite::params![chat_id, key.as_str()],
        )?;
        Ok(())
    }

    pub fn chats_with_overrides(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT chat_id FROM chat_settings")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        let conn = Connection::open_in_memory().unwrap();
        SettingsStore::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn snapshot_resolves_override_over_default() {
        let store = store();
        store.set(-100, ChatSettingsKey::SpamBanThreshold, "75").unwrap();

        let settings = store.chat_settings(-100).unwrap();
        assert_eq!(settings.get(ChatSettingsKey::SpamBanThreshold).to_float(), 75.0);
        // Untouched key resolves to its default.
        assert_eq!(settings.get(ChatSettingsKey::SpamWarnThreshold).to_float(), 40.0);
    }

    #[test]
    fn set_is_an_upsert() {
        let store = store();
        store.set(-100, ChatSettingsKey::DetectSpam, "false").unwrap();
        store.set(-100, ChatSettingsKey::DetectSpam, "true").unwrap();

        let settings = store.chat_settings(-100).unwrap();
        assert!(settings.get(ChatSettingsKey::DetectSpam).to_bool());
    }

    #[test]
    fn unset_reverts_to_default() {
        let store = store();
        store.set(-100, ChatSettingsKey::AutoSpamMaxMessages, "99").unwrap();
        store.unset(-100, ChatSettingsKey::AutoSpamMaxMessages).unwrap();

        let settings = store.chat_settings(-100).unwrap();
        assert_eq!(settings.get(ChatSettingsKey::AutoSpamMaxMessages).to_int(), 5);
        assert!(!settings.is_overridden(ChatSettingsKey::AutoSpamMaxMessages));
    }

    #[test]
    fn chats_are_isolated() {
        let store = store();
        store.set(-1, ChatSettingsKey::BayesEnabled, "false").unwrap();

        let other = store.chat_settings(-2).unwrap();
        assert!(other.get(ChatSettingsKey::BayesEnabled).to_bool());
        assert_eq!(store.chats_with_overrides().unwrap(), vec![-1]);
    }
}
