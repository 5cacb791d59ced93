use rusqlite::{Connection, Result};

/// Initialise Bayes counter tables. Safe to call on every startup
/// (idempotent).
///
/// Rows are keyed on (token, chat_id) with NULL chat_id for the global
/// scope. SQLite unique indexes treat NULLs as distinct, so upserts go
/// through an explicit UPDATE-then-INSERT instead of ON CONFLICT.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bayes_tokens (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            token       TEXT NOT NULL,
            chat_id     INTEGER,
            spam_count  INTEGER NOT NULL DEFAULT 0,
            ham_count   INTEGER NOT NULL DEFAULT 0,
            total_count INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bayes_tokens_scope
            ON bayes_tokens(chat_id, token);

        CREATE TABLE IF NOT EXISTS bayes_classes (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id       INTEGER,
            is_spam       INTEGER NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            token_count   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bayes_classes_scope
            ON bayes_classes(chat_id, is_spam);",
    )
}
