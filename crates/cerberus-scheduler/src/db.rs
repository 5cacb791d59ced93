use rusqlite::{Connection, Result};

/// Initialise the delayed-task table. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS delayed_tasks (
            id          TEXT PRIMARY KEY,
            fire_at     TEXT NOT NULL,
            function    TEXT NOT NULL,
            payload     TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_delayed_tasks_due
            ON delayed_tasks(status, fire_at);",
    )
}
