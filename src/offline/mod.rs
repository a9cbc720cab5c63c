//! Offline queue and sync manager
//!
//! Progress and score events are written to a local SQLite queue first and
//! pushed to the backend whenever the device is online.

mod events;
mod queue;
mod store;
mod sync;
mod transport;

pub use events::{EventKind, EventPayload, ProgressEvent, QueuedEvent, ScoreEvent, SyncStatus};
pub use queue::OfflineQueue;
pub use store::{EventStore, SqliteEventStore};
pub use sync::{KindReport, SyncManager, SyncReport};
pub use transport::{HttpTransport, SyncTransport, TransportError};

#[cfg(feature = "python")]
pub use sync::PyOfflineSync;
