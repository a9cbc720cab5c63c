//! Replays the offline queue against the backend once connectivity returns

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::events::{EventKind, QueuedEvent};
use super::queue::OfflineQueue;
use super::transport::SyncTransport;
use crate::error::Result;
use crate::util::lock;

/// Counts for one event kind in a sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

impl KindReport {
    fn absorb(&mut self, other: KindReport) {
        self.attempted += other.attempted;
        self.synced += other.synced;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub progress: KindReport,
    pub scores: KindReport,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.progress.synced + self.scores.synced
    }

    pub fn failed(&self) -> usize {
        self.progress.failed + self.scores.failed
    }

    fn kind_mut(&mut self, kind: EventKind) -> &mut KindReport {
        match kind {
            EventKind::Progress => &mut self.progress,
            EventKind::Score => &mut self.scores,
        }
    }

    fn absorb(&mut self, other: SyncReport) {
        self.progress.absorb(other.progress);
        self.scores.absorb(other.scores);
    }
}

/// `rerun` is only ever set while `running` is
#[derive(Debug, Default)]
struct PassState {
    running: bool,
    rerun: bool,
}

/// Tracks connectivity and drains the queue through a transport.
///
/// At most one pass runs at a time. A pass requested while another is in
/// flight is folded into it: the running pass goes around once more before
/// it finishes.
pub struct SyncManager<T: SyncTransport> {
    queue: OfflineQueue,
    transport: T,
    online: AtomicBool,
    pass: Mutex<PassState>,
}

impl<T: SyncTransport> SyncManager<T> {
    /// Starts offline; the first `set_online(true)` flushes anything left
    /// over from earlier runs.
    pub fn new(queue: OfflineQueue, transport: T) -> Self {
        Self {
            queue,
            transport,
            online: AtomicBool::new(false),
            pass: Mutex::new(PassState::default()),
        }
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a connectivity change. Going from offline to online runs a
    /// sync pass and returns its report.
    pub fn set_online(&self, online: bool) -> Option<SyncReport> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            info!("connection restored, syncing offline data");
            return self.sync_pass();
        }
        if !online && was_online {
            info!("connection lost, queueing events locally");
        }
        None
    }

    /// Push every pending event, progress first, then scores.
    ///
    /// Returns `None` when another pass is already running; that pass will
    /// pick up the work.
    pub fn sync_pass(&self) -> Option<SyncReport> {
        {
            let mut state = lock(&self.pass);
            if state.running {
                state.rerun = true;
                debug!("sync pass already running, coalescing");
                return None;
            }
            state.running = true;
        }

        let mut report = SyncReport::default();
        loop {
            report.absorb(self.run_once());

            // Checking for a late request and releasing the pass happen under
            // the same lock a late caller takes, so no request slips between.
            let mut state = lock(&self.pass);
            if !state.rerun {
                state.running = false;
                break;
            }
            state.rerun = false;
            debug!("sync requested during the pass, going around again");
        }

        info!(
            synced = report.synced(),
            failed = report.failed(),
            "sync pass finished"
        );
        Some(report)
    }

    fn run_once(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for kind in EventKind::ALL {
            let events = match self.queue.pending(kind) {
                Ok(events) => events,
                Err(e) => {
                    error!(kind = kind.as_str(), error = %e, "failed to read pending events");
                    continue;
                }
            };

            let counts = report.kind_mut(kind);
            for event in &events {
                counts.attempted += 1;
                if self.deliver(event) {
                    counts.synced += 1;
                } else {
                    counts.failed += 1;
                }
            }
        }
        report
    }

    fn deliver(&self, event: &QueuedEvent) -> bool {
        if let Err(e) = self.transport.send(event) {
            warn!(event_id = event.id, kind = event.kind().as_str(), error = %e, "sync failed, event stays pending");
            return false;
        }

        match self.queue.mark_synced(event.id) {
            Ok(_) => true,
            Err(e) => {
                error!(event_id = event.id, error = %e, "event delivered but could not be marked synced");
                false
            }
        }
    }

    pub fn pending(&self, kind: EventKind) -> Result<Vec<QueuedEvent>> {
        self.queue.pending(kind)
    }

    /// Garbage-collect events the backend already acknowledged
    pub fn clear_synced(&self) -> Result<usize> {
        let removed = self.queue.purge_synced()?;
        debug!(removed, "cleared synced events");
        Ok(removed)
    }
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub use self::python::PyOfflineSync;

#[cfg(feature = "python")]
mod python {
    use std::path::PathBuf;

    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    use super::{SyncManager, SyncReport};
    use crate::config::CoreConfig;
    use crate::error::to_py_json;
    use crate::offline::{EventKind, HttpTransport, OfflineQueue, ProgressEvent, ScoreEvent};

    /// Offline queue plus sync manager. `queue_path` and `base_url`
    /// override the config file.
    #[pyclass(name = "OfflineSync")]
    pub struct PyOfflineSync {
        manager: SyncManager<HttpTransport>,
    }

    #[pymethods]
    impl PyOfflineSync {
        #[new]
        #[pyo3(signature = (queue_path=None, base_url=None, config_path=None))]
        fn new(queue_path: Option<PathBuf>, base_url: Option<String>, config_path: Option<PathBuf>) -> PyResult<Self> {
            let mut config = CoreConfig::load(config_path.as_deref())?;
            if let Some(path) = queue_path {
                config.storage.queue_path = path;
            }
            if let Some(url) = base_url {
                config.sync.base_url = url;
            }
            Ok(Self {
                manager: SyncManager::new(OfflineQueue::from_config(&config.storage), HttpTransport::new(&config.sync)),
            })
        }

        fn is_available(&self) -> bool {
            self.manager.queue().is_available()
        }

        /// Returns the queued id, or None when the queue is disabled
        fn enqueue_progress(
            &self,
            user_id: &str,
            question_id: &str,
            answer: &str,
            correct: bool,
            time_spent: f64,
        ) -> PyResult<Option<i64>> {
            let event = ProgressEvent {
                user_id: user_id.to_string(),
                question_id: question_id.to_string(),
                answer: answer.to_string(),
                correct,
                time_spent,
            };
            Ok(self.manager.queue().enqueue(event)?.map(|e| e.id))
        }

        /// Queue a score event produced by `QuizSession.score_event_json`
        fn enqueue_score_json(&self, event_json: &str) -> PyResult<Option<i64>> {
            let event: ScoreEvent =
                serde_json::from_str(event_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
            Ok(self.manager.queue().enqueue(event)?.map(|e| e.id))
        }

        fn set_online(&self, online: bool) -> PyResult<Option<String>> {
            self.manager.set_online(online).as_ref().map(to_py_json::<SyncReport>).transpose()
        }

        fn sync_pass(&self) -> PyResult<Option<String>> {
            self.manager.sync_pass().as_ref().map(to_py_json::<SyncReport>).transpose()
        }

        fn pending_count(&self, kind: &str) -> PyResult<usize> {
            let kind =
                EventKind::parse(kind).ok_or_else(|| PyValueError::new_err(format!("unknown event kind: {}", kind)))?;
            Ok(self.manager.queue().pending_count(kind)?)
        }

        fn clear_synced(&self) -> PyResult<usize> {
            Ok(self.manager.clear_synced()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::events::{ProgressEvent, ScoreEvent};
    use crate::offline::store::SqliteEventStore;
    use crate::offline::transport::TransportError;
    use crate::session::GameMode;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex, OnceLock, Weak};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedTransport {
        reject: Mutex<HashSet<i64>>,
        sent: Mutex<Vec<i64>>,
    }

    impl SyncTransport for ScriptedTransport {
        fn send(&self, event: &QueuedEvent) -> std::result::Result<(), TransportError> {
            if self.reject.lock().unwrap().contains(&event.id) {
                return Err(TransportError::Rejected { status: 500 });
            }
            self.sent.lock().unwrap().push(event.id);
            Ok(())
        }
    }

    fn memory_queue() -> OfflineQueue {
        OfflineQueue::with_store(Arc::new(SqliteEventStore::open_in_memory().unwrap()))
    }

    fn progress(question: &str) -> ProgressEvent {
        ProgressEvent {
            user_id: "u1".into(),
            question_id: question.into(),
            answer: "7".into(),
            correct: true,
            time_spent: 11.0,
        }
    }

    fn score() -> ScoreEvent {
        ScoreEvent {
            user_id: "u1".into(),
            game_mode: GameMode::Survival,
            score: 40,
            xp_earned: 40,
            questions_answered: 3,
            correct_answers: 2,
        }
    }

    #[test]
    fn test_partial_failure_keeps_rejected_pending() {
        let queue = memory_queue();
        let ids: Vec<i64> = ["q1", "q2", "q3"]
            .iter()
            .map(|q| queue.enqueue(progress(q)).unwrap().unwrap().id)
            .collect();

        let transport = ScriptedTransport::default();
        transport.reject.lock().unwrap().insert(ids[1]);
        let manager = SyncManager::new(queue, transport);

        let report = manager.sync_pass().unwrap();
        assert_eq!(report.progress, KindReport { attempted: 3, synced: 2, failed: 1 });
        assert_eq!(*manager.transport().sent.lock().unwrap(), vec![ids[0], ids[2]]);

        let pending = manager.pending(EventKind::Progress).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ids[1]);

        // Once accepted, the last one drains
        manager.transport().reject.lock().unwrap().clear();
        let report = manager.sync_pass().unwrap();
        assert_eq!(report.progress.synced, 1);
        assert!(manager.pending(EventKind::Progress).unwrap().is_empty());
    }

    #[test]
    fn test_progress_before_scores() {
        let queue = memory_queue();
        let s = queue.enqueue(score()).unwrap().unwrap().id;
        let p = queue.enqueue(progress("q1")).unwrap().unwrap().id;

        let manager = SyncManager::new(queue, ScriptedTransport::default());
        let report = manager.sync_pass().unwrap();
        assert_eq!(report.synced(), 2);
        assert_eq!(*manager.transport().sent.lock().unwrap(), vec![p, s]);
    }

    #[test]
    fn test_online_transition_triggers_pass() {
        let queue = memory_queue();
        queue.enqueue(progress("q1")).unwrap();
        let manager = SyncManager::new(queue, ScriptedTransport::default());

        assert!(!manager.is_online());
        let report = manager.set_online(true).unwrap();
        assert_eq!(report.progress.synced, 1);

        // Already online: no new pass
        assert!(manager.set_online(true).is_none());
        assert!(manager.set_online(false).is_none());
        assert!(!manager.is_online());
    }

    #[test]
    fn test_clear_synced() {
        let queue = memory_queue();
        queue.enqueue(progress("q1")).unwrap();
        queue.enqueue(progress("q2")).unwrap();
        let manager = SyncManager::new(queue, ScriptedTransport::default());

        manager.sync_pass().unwrap();
        assert_eq!(manager.clear_synced().unwrap(), 2);
        assert_eq!(manager.clear_synced().unwrap(), 0);
    }

    #[test]
    fn test_disabled_queue_syncs_nothing() {
        let manager = SyncManager::new(OfflineQueue::disabled("no disk"), ScriptedTransport::default());
        let report = manager.sync_pass().unwrap();
        assert_eq!(report, SyncReport::default());
    }

    /// Blocks on the first send until the test releases it
    struct GatedTransport {
        started: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
        sent: Mutex<Vec<i64>>,
    }

    impl SyncTransport for GatedTransport {
        fn send(&self, event: &QueuedEvent) -> std::result::Result<(), TransportError> {
            if let Some(started) = self.started.lock().unwrap().take() {
                started.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            self.sent.lock().unwrap().push(event.id);
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_pass_is_coalesced() {
        let queue = memory_queue();
        queue.enqueue(progress("q1")).unwrap();
        queue.enqueue(progress("q2")).unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = GatedTransport {
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(release_rx),
            sent: Mutex::new(Vec::new()),
        };
        let manager = Arc::new(SyncManager::new(queue.clone(), transport));

        let runner = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.sync_pass())
        };

        started_rx.recv().unwrap();
        // Enqueued while the first pass is in flight
        let late = queue.enqueue(progress("q3")).unwrap().unwrap().id;
        assert!(manager.sync_pass().is_none());
        release_tx.send(()).unwrap();

        let report = runner.join().unwrap().unwrap();
        assert_eq!(report.progress.synced, 3);

        let sent = manager.transport().sent.lock().unwrap().clone();
        let unique: HashSet<i64> = sent.iter().copied().collect();
        assert_eq!(sent.len(), unique.len());
        assert!(unique.contains(&late));
        assert!(manager.pending(EventKind::Progress).unwrap().is_empty());
    }

    /// On its last scheduled send, queues one more event and asks the
    /// manager for a pass, the latest point a request can reach a running pass
    struct LastSendRequester {
        manager: OnceLock<Weak<SyncManager<LastSendRequester>>>,
        queue: OfflineQueue,
        trigger_on: i64,
        late: Mutex<Option<i64>>,
        coalesced: Mutex<Vec<bool>>,
        sent: Mutex<Vec<i64>>,
    }

    impl SyncTransport for LastSendRequester {
        fn send(&self, event: &QueuedEvent) -> std::result::Result<(), TransportError> {
            self.sent.lock().unwrap().push(event.id);
            if event.id == self.trigger_on {
                let late = self.queue.enqueue(progress("late")).unwrap().unwrap().id;
                *self.late.lock().unwrap() = Some(late);
                let manager = self.manager.get().and_then(Weak::upgrade).unwrap();
                self.coalesced.lock().unwrap().push(manager.sync_pass().is_none());
            }
            Ok(())
        }
    }

    #[test]
    fn test_request_at_end_of_pass_is_not_lost() {
        let queue = memory_queue();
        queue.enqueue(progress("q1")).unwrap();
        let last = queue.enqueue(progress("q2")).unwrap().unwrap().id;

        let manager = Arc::new(SyncManager::new(
            queue.clone(),
            LastSendRequester {
                manager: OnceLock::new(),
                queue: queue.clone(),
                trigger_on: last,
                late: Mutex::new(None),
                coalesced: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            },
        ));
        manager.transport().manager.set(Arc::downgrade(&manager)).unwrap();

        let report = manager.sync_pass().unwrap();
        let transport = manager.transport();
        assert_eq!(*transport.coalesced.lock().unwrap(), vec![true]);

        let late = transport.late.lock().unwrap().unwrap();
        assert!(transport.sent.lock().unwrap().contains(&late));
        assert_eq!(report.progress, KindReport { attempted: 3, synced: 3, failed: 0 });
        assert!(manager.pending(EventKind::Progress).unwrap().is_empty());
    }

    /// Slow enough that passes overlap
    #[derive(Default)]
    struct SlowTransport {
        sends: AtomicUsize,
    }

    impl SyncTransport for SlowTransport {
        fn send(&self, _event: &QueuedEvent) -> std::result::Result<(), TransportError> {
            thread::sleep(Duration::from_micros(200));
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_overlapping_requests_leave_nothing_pending() {
        let queue = memory_queue();
        let manager = Arc::new(SyncManager::new(queue.clone(), SlowTransport::default()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let manager = Arc::clone(&manager);
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..15 {
                        queue.enqueue(progress(&format!("t{}_{}", t, i))).unwrap();
                        manager.sync_pass();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Every request either ran a pass or was folded into one
        assert!(manager.pending(EventKind::Progress).unwrap().is_empty());
        assert_eq!(manager.transport().sends.load(Ordering::SeqCst), 120);
    }
}
