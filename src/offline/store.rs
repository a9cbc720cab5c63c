//! Durable storage for queued offline events
//!
//! Every row is written on its own, so a damaged payload never affects the
//! rows around it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use tracing::warn;

use super::events::{EventKind, EventPayload, QueuedEvent, SyncStatus};
use crate::error::Result;
use crate::util::lock;

/// Storage capability the offline queue needs
pub trait EventStore: Send + Sync {
    /// Persist a new pending event and return it with its assigned id
    fn insert(&self, payload: &EventPayload) -> Result<QueuedEvent>;

    /// Pending events of one kind, oldest first
    fn pending(&self, kind: EventKind) -> Result<Vec<QueuedEvent>>;

    /// Returns false if no pending event has this id
    fn mark_synced(&self, id: i64) -> Result<bool>;

    fn delete(&self, id: i64) -> Result<bool>;

    /// Drop every synced event, returning how many were removed
    fn purge_synced(&self) -> Result<usize>;

    fn count(&self, kind: EventKind, status: SyncStatus) -> Result<usize>;
}

/// SQLite-backed event store
#[derive(Clone)]
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    /// Open or create the queue database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Events must survive a crash right after enqueue returns
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, payload: &EventPayload) -> Result<QueuedEvent> {
        let json = payload.to_json()?;
        let timestamp = Utc::now();
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO offline_events (kind, user_id, payload, timestamp, synced) VALUES (?1, ?2, ?3, ?4, 0)",
            params![payload.kind().as_str(), payload.user_id(), json, timestamp.timestamp_millis()],
        )?;

        Ok(QueuedEvent {
            id: conn.last_insert_rowid(),
            payload: payload.clone(),
            timestamp,
            status: SyncStatus::Pending,
        })
    }

    fn pending(&self, kind: EventKind) -> Result<Vec<QueuedEvent>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, payload, timestamp FROM offline_events WHERE kind = ?1 AND synced = 0 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![kind.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, json, ts) = row?;
            match EventPayload::from_json(kind, &json) {
                Ok(payload) => events.push(QueuedEvent {
                    id,
                    payload,
                    timestamp: Utc.timestamp_millis_opt(ts).single().unwrap_or_else(Utc::now),
                    status: SyncStatus::Pending,
                }),
                Err(e) => warn!(event_id = id, kind = kind.as_str(), error = %e, "skipping unreadable queued event"),
            }
        }
        Ok(events)
    }

    fn mark_synced(&self, id: i64) -> Result<bool> {
        let conn = lock(&self.conn);
        let changed = conn.execute(
            "UPDATE offline_events SET synced = 1 WHERE id = ?1 AND synced = 0",
            params![id],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = lock(&self.conn);
        let changed = conn.execute("DELETE FROM offline_events WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn purge_synced(&self) -> Result<usize> {
        let conn = lock(&self.conn);
        Ok(conn.execute("DELETE FROM offline_events WHERE synced = 1", [])?)
    }

    fn count(&self, kind: EventKind, status: SyncStatus) -> Result<usize> {
        let conn = lock(&self.conn);
        let synced = i32::from(status == SyncStatus::Synced);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM offline_events WHERE kind = ?1 AND synced = ?2",
            params![kind.as_str(), synced],
            |r| r.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// AUTOINCREMENT keeps ids monotonic even after rows are purged
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS offline_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    user_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_offline_kind_synced ON offline_events(kind, synced, id);
CREATE INDEX IF NOT EXISTS idx_offline_user ON offline_events(user_id);
"#;
