use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::events::{EventKind, EventPayload, QueuedEvent, SyncStatus};
use super::store::{EventStore, SqliteEventStore};
use crate::config::StorageConfig;
use crate::error::{QuizError, Result};

/// Local queue of events waiting to reach the backend.
///
/// When the store cannot be opened the queue runs disabled: enqueues are
/// dropped with a warning and nothing is ever pending. Gameplay keeps going.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Option<Arc<dyn EventStore>>,
    unavailable_reason: Option<String>,
}

impl OfflineQueue {
    /// Open the SQLite queue at `path`
    pub fn try_open(path: &Path) -> Result<Self> {
        let store = SqliteEventStore::open(path)
            .map_err(|e| QuizError::PersistenceUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_store(Arc::new(store)))
    }

    /// Like [`OfflineQueue::try_open`], but falls back to a disabled queue
    pub fn open(path: &Path) -> Self {
        Self::try_open(path).unwrap_or_else(|e| {
            warn!(error = %e, "offline queue disabled, events will not be persisted");
            Self::disabled(e.to_string())
        })
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::open(&config.queue_path)
    }

    pub fn with_store(store: Arc<dyn EventStore>) -> Self {
        Self {
            store: Some(store),
            unavailable_reason: None,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            store: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// Persist an event. `Ok(None)` means the queue is disabled and the
    /// event was dropped.
    pub fn enqueue(&self, payload: impl Into<EventPayload>) -> Result<Option<QueuedEvent>> {
        let payload = payload.into();
        let Some(store) = &self.store else {
            warn!(kind = payload.kind().as_str(), user_id = payload.user_id(), "offline queue disabled, dropping event");
            return Ok(None);
        };

        let event = store.insert(&payload)?;
        debug!(event_id = event.id, kind = event.kind().as_str(), "queued offline event");
        Ok(Some(event))
    }

    /// Snapshot of pending events of one kind, oldest first
    pub fn pending(&self, kind: EventKind) -> Result<Vec<QueuedEvent>> {
        match &self.store {
            Some(store) => store.pending(kind),
            None => Ok(Vec::new()),
        }
    }

    pub fn pending_count(&self, kind: EventKind) -> Result<usize> {
        match &self.store {
            Some(store) => store.count(kind, SyncStatus::Pending),
            None => Ok(0),
        }
    }

    pub fn mark_synced(&self, id: i64) -> Result<bool> {
        match &self.store {
            Some(store) => store.mark_synced(id),
            None => Ok(false),
        }
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        match &self.store {
            Some(store) => store.delete(id),
            None => Ok(false),
        }
    }

    /// Remove events the backend already acknowledged
    pub fn purge_synced(&self) -> Result<usize> {
        match &self.store {
            Some(store) => store.purge_synced(),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::events::ProgressEvent;
    use tempfile::tempdir;

    fn progress(question: &str) -> ProgressEvent {
        ProgressEvent {
            user_id: "u1".into(),
            question_id: question.into(),
            answer: "5".into(),
            correct: false,
            time_spent: 20.0,
        }
    }

    #[test]
    fn test_enqueue_and_pending() {
        let dir = tempdir().unwrap();
        let queue = OfflineQueue::open(&dir.path().join("offline.db"));
        assert!(queue.is_available());

        let first = queue.enqueue(progress("q1")).unwrap().unwrap();
        let second = queue.enqueue(progress("q2")).unwrap().unwrap();
        assert!(first.id < second.id);
        assert_eq!(queue.pending_count(EventKind::Progress).unwrap(), 2);

        assert!(queue.mark_synced(first.id).unwrap());
        let pending = queue.pending(EventKind::Progress).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[test]
    fn test_unopenable_path_disables_queue() {
        let dir = tempdir().unwrap();
        // A directory where the database file should be
        let blocker = dir.path().join("offline.db");
        std::fs::create_dir_all(&blocker).unwrap();

        let err = OfflineQueue::try_open(&blocker).err().unwrap();
        assert!(matches!(err, QuizError::PersistenceUnavailable(ref m) if m.contains("offline.db")));

        let queue = OfflineQueue::open(&blocker);
        assert!(!queue.is_available());
        assert!(queue.unavailable_reason().is_some());
        assert!(queue.enqueue(progress("q1")).unwrap().is_none());
        assert!(queue.pending(EventKind::Progress).unwrap().is_empty());
        assert_eq!(queue.purge_synced().unwrap(), 0);
    }
}
