use rusqlite::{Connection, Result};

/// Initialise the shared cache table. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            namespace   TEXT NOT NULL,
            key         TEXT NOT NULL,
            data        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        );",
    )
}
