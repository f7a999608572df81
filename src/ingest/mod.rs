//! Ingestion — pulls records from a message source and commits new ones
//! exactly once.

pub mod engine;
pub mod poller;

pub use engine::{IngestEngine, SyncReport, SyncStatus};
pub use poller::spawn_sync_poller;
