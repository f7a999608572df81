//! Ingestion engine — bounded, idempotent sync runs against a message source.
//!
//! Each run pulls up to `limit` records most-recent-first, filters out
//! non-mail items, dedups on the host-assigned `external_id`, and commits
//! per record. A bad record is skipped and counted; only the source itself
//! going away ends a run early, and even then everything already committed
//! stays committed.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, warn};

use crate::source::{ItemKind, MessageSource, RawMessage};
use crate::store::{Database, InsertOutcome, NewMessage};

/// Terminal status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every examined record was committed or deduplicated.
    Completed,
    /// The run finished, but at least one record was skipped on error.
    CompletedWithErrors,
    /// The source became unreachable; the report carries partial tallies.
    SourceUnavailable,
}

/// Tally of one sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub requested_limit: usize,
    /// Records pulled from the source, including silently filtered ones.
    pub examined: usize,
    pub accepted: usize,
    pub skipped_duplicate: usize,
    pub skipped_error: usize,
    pub status: SyncStatus,
}

impl SyncReport {
    fn new(requested_limit: usize) -> Self {
        Self {
            requested_limit,
            examined: 0,
            accepted: 0,
            skipped_duplicate: 0,
            skipped_error: 0,
            status: SyncStatus::Completed,
        }
    }
}

/// Orchestrates pulling, filtering, and committing messages.
pub struct IngestEngine {
    source: Arc<dyn MessageSource>,
    db: Arc<dyn Database>,
}

impl IngestEngine {
    pub fn new(source: Arc<dyn MessageSource>, db: Arc<dyn Database>) -> Self {
        Self { source, db }
    }

    /// Run one bounded sync: examine up to `limit` records, commit the new
    /// plain-mail ones.
    ///
    /// Safe to call concurrently and to re-run from any point: dedup is
    /// enforced by the store's uniqueness constraint on `external_id`, so a
    /// racing insert is reported as a duplicate, never a second row.
    pub async fn sync(&self, limit: usize) -> SyncReport {
        let mut report = SyncReport::new(limit);

        let mut stream = match self.source.list_recent(limit).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Message source unavailable, sync aborted");
                report.status = SyncStatus::SourceUnavailable;
                return report;
            }
        };

        while let Some(item) = stream.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    // Source lost mid-run. Prior commits stand; report what
                    // we got through.
                    warn!(error = %e, examined = report.examined, "Message source lost mid-sync");
                    report.status = SyncStatus::SourceUnavailable;
                    return report;
                }
            };
            report.examined += 1;

            // Non-mail items (meeting requests etc.) are filtered silently:
            // neither accepted nor duplicate nor error.
            if raw.kind != ItemKind::Mail {
                debug!(external_id = %raw.external_id, kind = ?raw.kind, "Skipping non-mail item");
                continue;
            }

            let message = match build_message(&raw) {
                Ok(message) => message,
                Err(reason) => {
                    report.skipped_error += 1;
                    warn!(external_id = %raw.external_id, reason = %reason, "Skipping malformed record");
                    continue;
                }
            };

            match self.db.insert_message_if_absent(&message).await {
                Ok(InsertOutcome::Inserted) => {
                    report.accepted += 1;
                    debug!(external_id = %message.external_id, "Message ingested");
                }
                Ok(InsertOutcome::AlreadyExists) => {
                    report.skipped_duplicate += 1;
                }
                Err(e) => {
                    // One bad commit never aborts the run.
                    report.skipped_error += 1;
                    error!(external_id = %message.external_id, error = %e, "Failed to commit message");
                }
            }
        }

        if report.skipped_error > 0 {
            report.status = SyncStatus::CompletedWithErrors;
        }
        report
    }
}

/// Build a message row from a raw record, defaulting absent optional fields.
///
/// The only hard requirement is a non-empty `external_id` — without the
/// dedup key the record cannot be ingested exactly once.
fn build_message(raw: &RawMessage) -> Result<NewMessage, String> {
    if raw.external_id.trim().is_empty() {
        return Err("missing external id".to_string());
    }
    Ok(NewMessage {
        external_id: raw.external_id.clone(),
        subject: raw.subject.clone().unwrap_or_default(),
        sender: raw.sender_name.clone().unwrap_or_default(),
        body_text: raw.body_text.clone().unwrap_or_default(),
        received_at: raw.received_at,
        is_read: !raw.is_unread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use crate::error::SourceError;
    use crate::source::MessageStream;
    use crate::store::LibSqlBackend;

    /// Scripted source: serves `records` up to the limit, optionally failing
    /// upfront or after the nth item.
    struct FakeSource {
        records: Vec<RawMessage>,
        unavailable: bool,
        fail_after: Option<usize>,
    }

    impl FakeSource {
        fn new(records: Vec<RawMessage>) -> Self {
            Self {
                records,
                unavailable: false,
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn list_recent(&self, limit: usize) -> Result<MessageStream<'_>, SourceError> {
            if self.unavailable {
                return Err(SourceError::Unavailable {
                    reason: "connection refused".to_string(),
                });
            }
            let mut items: Vec<Result<RawMessage, SourceError>> = self
                .records
                .iter()
                .take(limit)
                .cloned()
                .map(Ok)
                .collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(SourceError::Unavailable {
                    reason: "connection dropped".to_string(),
                }));
            }
            Ok(futures::stream::iter(items).boxed())
        }
    }

    fn mail(external_id: &str, minutes_ago: i64) -> RawMessage {
        RawMessage {
            external_id: external_id.to_string(),
            kind: ItemKind::Mail,
            subject: Some(format!("Subject {external_id}")),
            sender_name: Some("Alice".to_string()),
            body_text: Some("Body".to_string()),
            received_at: Utc::now() - Duration::minutes(minutes_ago),
            is_unread: true,
        }
    }

    async fn engine_with(source: FakeSource) -> (IngestEngine, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = IngestEngine::new(Arc::new(source), Arc::clone(&db));
        (engine, db)
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let records = vec![mail("a", 1), mail("b", 2), mail("c", 3)];
        let (engine, db) = engine_with(FakeSource::new(records)).await;

        let first = engine.sync(10).await;
        assert_eq!(first.accepted, 3);
        assert_eq!(first.skipped_duplicate, 0);
        assert_eq!(first.status, SyncStatus::Completed);

        let second = engine.sync(10).await;
        assert_eq!(second.accepted, 0);
        assert_eq!(second.skipped_duplicate, 3);
        assert_eq!(second.status, SyncStatus::Completed);

        assert_eq!(db.list_recent_messages(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn malformed_record_is_contained() {
        let mut records: Vec<RawMessage> = (1..=10).map(|i| mail(&format!("m{i}"), i)).collect();
        records[4].external_id = String::new();
        let (engine, db) = engine_with(FakeSource::new(records)).await;

        let report = engine.sync(10).await;
        assert_eq!(report.accepted, 9);
        assert_eq!(report.skipped_error, 1);
        assert_eq!(report.status, SyncStatus::CompletedWithErrors);
        assert_eq!(db.list_recent_messages(20).await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn non_mail_items_filtered_silently() {
        let mut meeting = mail("meet-1", 1);
        meeting.kind = ItemKind::Meeting;
        let records = vec![mail("a", 2), meeting, mail("b", 3)];
        let (engine, _db) = engine_with(FakeSource::new(records)).await;

        let report = engine.sync(10).await;
        assert_eq!(report.examined, 3);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.skipped_duplicate, 0);
        assert_eq!(report.skipped_error, 0);
        assert_eq!(report.status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn limit_bounds_examination() {
        let records: Vec<RawMessage> = (1..=5).map(|i| mail(&format!("m{i}"), i)).collect();
        let (engine, _db) = engine_with(FakeSource::new(records)).await;

        let report = engine.sync(3).await;
        assert_eq!(report.examined, 3);
        assert_eq!(report.accepted, 3);
    }

    #[tokio::test]
    async fn source_unavailable_upfront() {
        let mut source = FakeSource::new(vec![mail("a", 1)]);
        source.unavailable = true;
        let (engine, db) = engine_with(source).await;

        let report = engine.sync(10).await;
        assert_eq!(report.status, SyncStatus::SourceUnavailable);
        assert_eq!(report.examined, 0);
        assert_eq!(report.accepted, 0);
        assert!(db.list_recent_messages(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mid_stream_failure_preserves_prior_commits() {
        let mut source = FakeSource::new(vec![mail("a", 1), mail("b", 2), mail("c", 3)]);
        source.fail_after = Some(2);
        let (engine, db) = engine_with(source).await;

        let report = engine.sync(10).await;
        assert_eq!(report.status, SyncStatus::SourceUnavailable);
        assert_eq!(report.accepted, 2);
        // No rollback: the two committed records remain
        assert_eq!(db.list_recent_messages(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_within_a_single_run() {
        let records = vec![mail("same", 1), mail("same", 2)];
        let (engine, db) = engine_with(FakeSource::new(records)).await;

        let report = engine.sync(10).await;
        assert_eq!(report.accepted, 1);
        assert_eq!(report.skipped_duplicate, 1);
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(db.list_recent_messages(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn defaults_absent_fields_instead_of_failing() {
        let record = RawMessage {
            external_id: "bare".to_string(),
            kind: ItemKind::Mail,
            subject: None,
            sender_name: None,
            body_text: None,
            received_at: Utc::now(),
            is_unread: false,
        };
        let (engine, db) = engine_with(FakeSource::new(vec![record])).await;

        let report = engine.sync(10).await;
        assert_eq!(report.accepted, 1);

        let stored = db.get_message_by_external_id("bare").await.unwrap().unwrap();
        assert_eq!(stored.subject, "");
        assert_eq!(stored.body_text, "");
        assert!(stored.is_read);
    }

    #[tokio::test]
    async fn concurrent_syncs_never_duplicate() {
        let records: Vec<RawMessage> = (1..=8).map(|i| mail(&format!("m{i}"), i)).collect();
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = Arc::new(IngestEngine::new(
            Arc::new(FakeSource::new(records)),
            Arc::clone(&db),
        ));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move { engine.sync(10).await }));
        }
        let mut total_accepted = 0;
        for handle in handles {
            total_accepted += handle.await.unwrap().accepted;
        }

        assert_eq!(total_accepted, 8);
        assert_eq!(db.list_recent_messages(20).await.unwrap().len(), 8);
    }
}
