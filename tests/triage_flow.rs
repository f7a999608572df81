//! End-to-end flow: replay source → ingestion → provider-routed
//! classification, against an on-disk database.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use mail_triage::classify::Classifier;
use mail_triage::error::ProviderError;
use mail_triage::ingest::{IngestEngine, SyncStatus};
use mail_triage::provider::{
    ProviderClient, ProviderRequest, ProviderResponse, ProviderRouter,
};
use mail_triage::source::ReplaySource;
use mail_triage::store::{Database, LibSqlBackend, ProviderConfig};

const EXPORT: &str = r#"[
    {"external_id": "mail-1", "kind": "mail", "subject": "Invoice overdue",
     "sender_name": "Accounts", "body_text": "Please pay invoice #42.",
     "received_at": "2024-05-01T09:00:00Z", "is_unread": true},
    {"external_id": "mail-2", "kind": "mail", "subject": "Team lunch",
     "sender_name": "Bob", "body_text": "Pizza on Friday?",
     "received_at": "2024-05-02T09:00:00Z", "is_unread": true},
    {"external_id": "meet-1", "kind": "meeting", "subject": "Standup",
     "received_at": "2024-05-03T09:00:00Z"}
]"#;

/// Fake backend: the first-priority provider is down, the second answers.
struct FlakyPoolClient;

#[async_trait]
impl ProviderClient for FlakyPoolClient {
    async fn call(
        &self,
        name: &str,
        _credential: &SecretString,
        _request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        match name {
            "groq" => Err(ProviderError::CallFailed {
                provider: name.to_string(),
                reason: "HTTP 500".to_string(),
            }),
            _ => Ok(ProviderResponse {
                content: r#"{"category": "finance", "priority_score": 4, "confidence": 0.9}"#
                    .to_string(),
            }),
        }
    }
}

#[tokio::test]
async fn ingest_then_classify_with_failover() {
    let tmp = tempfile::tempdir().unwrap();

    let export_path = tmp.path().join("export.json");
    let mut file = std::fs::File::create(&export_path).unwrap();
    file.write_all(EXPORT.as_bytes()).unwrap();

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&tmp.path().join("triage.db"))
            .await
            .unwrap(),
    );
    db.upsert_provider(&ProviderConfig {
        name: "groq".to_string(),
        credential: SecretString::from("sk-groq"),
        priority: 1,
        active: true,
    })
    .await
    .unwrap();
    db.upsert_provider(&ProviderConfig {
        name: "openai".to_string(),
        credential: SecretString::from("sk-openai"),
        priority: 2,
        active: true,
    })
    .await
    .unwrap();

    // Ingest: two mail items accepted, the meeting filtered silently
    let source = Arc::new(ReplaySource::from_path(&export_path).unwrap());
    let engine = IngestEngine::new(source, Arc::clone(&db));

    let report = engine.sync(50).await;
    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.examined, 3);

    // Re-running the sync ingests nothing new
    let rerun = engine.sync(50).await;
    assert_eq!(rerun.accepted, 0);
    assert_eq!(rerun.skipped_duplicate, 2);

    // Classify through the pool: groq fails, openai answers
    let router = ProviderRouter::new(Arc::clone(&db), Arc::new(FlakyPoolClient));
    let classifier = Classifier::new(router);

    let pending = db.list_unprocessed_messages(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    for message in &pending {
        let classification = classifier.classify(message).await.unwrap();
        db.set_message_classification(
            &message.id,
            classification.priority_score,
            classification.confidence,
            &classification.category,
        )
        .await
        .unwrap();
    }

    assert!(db.list_unprocessed_messages(10).await.unwrap().is_empty());

    let stored = db
        .get_message_by_external_id("mail-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.category.as_deref(), Some("finance"));
    assert_eq!(stored.priority_score, Some(4));

    // Health counters reflect the failover: groq failed twice, openai
    // answered twice
    let groq = db.get_provider("groq").await.unwrap().unwrap();
    assert_eq!(groq.failure_count, 2);
    assert_eq!(groq.success_count, 0);
    let openai = db.get_provider("openai").await.unwrap().unwrap();
    assert_eq!(openai.success_count, 2);

    // The listing view never carries credentials
    let listing = db.list_providers().await.unwrap();
    let json = serde_json::to_string(&listing).unwrap();
    assert!(!json.contains("sk-groq"));
    assert!(!json.contains("credential"));
}
