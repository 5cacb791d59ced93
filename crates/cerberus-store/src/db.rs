use rusqlite::{Connection, Result};

/// Initialise chat state tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_chat_users_table(conn)?;
    create_chat_messages_table(conn)?;
    create_exemplar_tables(conn)?;
    create_chat_settings_table(conn)?;
    Ok(())
}

fn create_chat_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_users (
            chat_id         INTEGER NOT NULL,
            user_id         INTEGER NOT NULL,
            username        TEXT NOT NULL DEFAULT '',
            full_name       TEXT NOT NULL DEFAULT '',
            messages_count  INTEGER NOT NULL DEFAULT 0,
            is_spammer      INTEGER NOT NULL DEFAULT 0,
            metadata        TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_chat_users_username
            ON chat_users(chat_id, username);",
    )
}

fn create_chat_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id       INTEGER NOT NULL,
            user_id       INTEGER NOT NULL,
            message_id    INTEGER NOT NULL,
            message_text  TEXT NOT NULL,
            category      TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_user
            ON chat_messages(chat_id, user_id, message_id DESC);",
    )
}

/// Spam and ham exemplar stores share a schema; ham rows mostly arrive via
/// unban migration and /learn_ham.
fn create_exemplar_tables(conn: &Connection) -> Result<()> {
    for table in ["spam_messages", "ham_messages"] {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id       INTEGER NOT NULL,
                user_id       INTEGER NOT NULL,
                message_id    INTEGER NOT NULL,
                message_text  TEXT NOT NULL,
                reason        TEXT NOT NULL,
                score         REAL NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_user
                ON {table}(chat_id, user_id);
            CREATE INDEX IF NOT EXISTS idx_{table}_text
                ON {table}(message_text);"
        ))?;
    }
    Ok(())
}

fn create_chat_settings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_settings (
            chat_id     INTEGER NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (chat_id, key)
        );",
    )
}
