//! Background sync poller — runs the ingestion engine on a timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ingest::engine::{IngestEngine, SyncStatus};

/// Spawn a background task that runs `sync(limit)` every `interval_secs`.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_sync_poller(
    engine: Arc<IngestEngine>,
    interval_secs: u64,
    limit: usize,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Sync poller started — syncing up to {limit} messages every {interval_secs}s");

        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Sync poller shutting down");
                return;
            }

            let report = engine.sync(limit).await;
            match report.status {
                SyncStatus::Completed => info!(
                    accepted = report.accepted,
                    duplicates = report.skipped_duplicate,
                    "Sync run complete"
                ),
                SyncStatus::CompletedWithErrors => warn!(
                    accepted = report.accepted,
                    duplicates = report.skipped_duplicate,
                    errors = report.skipped_error,
                    "Sync run complete with errors"
                ),
                SyncStatus::SourceUnavailable => warn!(
                    accepted = report.accepted,
                    examined = report.examined,
                    "Sync run aborted: source unavailable"
                ),
            }
        }
    });

    (handle, shutdown_flag)
}
