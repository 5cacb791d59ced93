use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{DelayedTask, TaskFunction};

/// Shared handle for enqueueing and cancelling tasks while the engine loop
/// runs.
#[derive(Clone)]
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = conn.lock().unwrap();
            init_db(&conn)?;
        }
        Ok(Self { conn })
    }

    /// Enqueue a task. Re-adding an existing id replaces the old row, so a
    /// repeated notification only fires once.
    pub fn add_task(
        &self,
        id: &str,
        fire_at: DateTime<Utc>,
        function: TaskFunction,
        payload: serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO delayed_tasks
             (id, fire_at, function, payload, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
            rusqlite::params![
                id,
                fire_at.to_rfc3339(),
                function.as_str(),
                payload.to_string(),
                now
            ],
        )?;
        debug!(task_id = id, %fire_at, "delayed task enqueued");
        Ok(())
    }

    pub fn remove_task(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM delayed_tasks WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM delayed_tasks WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Drives task execution at ~1 s precision. Fired tasks are marked done and
/// forwarded over the delivery channel; tasks missed across a restart fire
/// on the first tick.
pub struct SchedulerEngine {
    conn: Arc<Mutex<Connection>>,
    fired_tx: mpsc::Sender<DelayedTask>,
}

impl SchedulerEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, fired_tx: mpsc::Sender<DelayedTask>) -> Result<Self> {
        {
            let conn = conn.lock().unwrap();
            init_db(&conn)?;
        }
        Ok(Self { conn, fired_tx })
    }

    /// Main event loop. Polls every second until `shutdown` broadcasts
    /// `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process all tasks whose firing time has arrived.
    pub fn tick(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        // Collect eagerly so the statement is dropped before the UPDATE.
        let due: Vec<(String, String, String, String, String)> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare_cached(
                "SELECT id, fire_at, function, payload, created_at FROM delayed_tasks
                 WHERE status = 'pending' AND fire_at <= ?1",
            )?;
            let rows: Vec<_> = stmt
                .query_map([&now], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for (id, fire_at, function_str, payload_str, created_at) in due {
            let function: TaskFunction = match function_str.parse() {
                Ok(f) => f,
                Err(e) => {
                    error!(task_id = %id, "bad task function: {e}");
                    self.mark_done(&id)?;
                    continue;
                }
            };
            let payload = serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null);

            self.mark_done(&id)?;
            debug!(task_id = %id, %function, "firing delayed task");

            let task = DelayedTask {
                id: id.clone(),
                fire_at,
                function,
                payload,
                created_at,
            };
            // try_send never blocks the tick loop.
            if self.fired_tx.try_send(task).is_err() {
                warn!(task_id = %id, "delivery channel full or closed, task dropped");
            }
        }
        Ok(())
    }

    fn mark_done(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE delayed_tasks SET status = 'done', updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> (SchedulerHandle, SchedulerEngine, mpsc::Receiver<DelayedTask>) {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let handle = SchedulerHandle::new(conn.clone()).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let engine = SchedulerEngine::new(conn, tx).unwrap();
        (handle, engine, rx)
    }

    #[tokio::test]
    async fn due_task_fires_once() {
        let (handle, engine, mut rx) = setup();
        handle
            .add_task(
                "del-1-2",
                Utc::now() - Duration::seconds(1),
                TaskFunction::DeleteMessage,
                serde_json::json!({"chat_id": 1, "message_id": 2}),
            )
            .unwrap();

        engine.tick().unwrap();
        let fired = rx.try_recv().unwrap();
        assert_eq!(fired.id, "del-1-2");
        assert_eq!(fired.payload["message_id"], 2);

        // Already done, second tick fires nothing.
        engine.tick().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn future_task_stays_pending() {
        let (handle, engine, mut rx) = setup();
        handle
            .add_task(
                "later",
                Utc::now() + Duration::seconds(60),
                TaskFunction::DeleteMessage,
                serde_json::json!({}),
            )
            .unwrap();

        engine.tick().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn re_adding_a_task_id_replaces_it() {
        let (handle, engine, mut rx) = setup();
        let fire_at = Utc::now() - Duration::seconds(1);
        handle
            .add_task("dup", fire_at, TaskFunction::DeleteMessage, serde_json::json!({"v": 1}))
            .unwrap();
        handle
            .add_task("dup", fire_at, TaskFunction::DeleteMessage, serde_json::json!({"v": 2}))
            .unwrap();

        engine.tick().unwrap();
        let fired = rx.try_recv().unwrap();
        assert_eq!(fired.payload["v"], 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_task_cancels_delivery() {
        let (handle, engine, mut rx) = setup();
        handle
            .add_task(
                "gone",
                Utc::now() - Duration::seconds(1),
                TaskFunction::DeleteMessage,
                serde_json::json!({}),
            )
            .unwrap();
        handle.remove_task("gone").unwrap();

        engine.tick().unwrap();
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            handle.remove_task("gone"),
            Err(SchedulerError::TaskNotFound { .. })
        ));
    }
}
