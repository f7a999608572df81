//! Classification enrichment — turns a stored message into a category,
//! priority score, and confidence by dispatching through the provider router.
//!
//! A background worker sweeps unclassified messages on a timer; a message
//! that fails to classify stays unprocessed and is retried on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ClassifyError, ProviderError};
use crate::provider::{ProviderRequest, ProviderRouter};
use crate::store::{Database, StoredMessage};

const SYSTEM_PROMPT: &str = "You are an email triage assistant. Classify the email you are given. \
     Respond with a single JSON object and nothing else: \
     {\"category\": \"<short label>\", \"priority_score\": <1-5>, \"confidence\": <0.0-1.0>}";

/// Bodies longer than this are truncated before being sent to a provider.
const MAX_BODY_CHARS: usize = 4000;

/// A parsed classification result.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    /// 1 (ignorable) to 5 (urgent).
    pub priority_score: i64,
    /// Provider-reported confidence in [0, 1].
    pub confidence: f64,
}

/// Classifies messages via the provider pool.
pub struct Classifier {
    router: ProviderRouter,
}

impl Classifier {
    pub fn new(router: ProviderRouter) -> Self {
        Self { router }
    }

    /// Classify one message. Which provider answers is the router's business.
    pub async fn classify(&self, message: &StoredMessage) -> Result<Classification, ClassifyError> {
        let request = classification_request(message);
        let result = self.router.dispatch(&request).await?;
        debug!(
            message_id = %message.id,
            provider = %result.provider,
            elapsed_ms = result.elapsed_ms,
            "Classification dispatched"
        );
        parse_classification(&result.response.content)
    }
}

/// Build the provider request for a message.
fn classification_request(message: &StoredMessage) -> ProviderRequest {
    let body: String = message.body_text.chars().take(MAX_BODY_CHARS).collect();
    ProviderRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "Subject: {}\nFrom: {}\n\n{}",
            message.subject, message.sender, body
        ),
        max_tokens: 256,
    }
}

#[derive(Deserialize)]
struct RawClassification {
    category: String,
    priority_score: i64,
    confidence: f64,
}

/// Parse a provider reply into a `Classification`.
///
/// Tolerates markdown code fences around the JSON; clamps out-of-range
/// numbers rather than rejecting them.
fn parse_classification(content: &str) -> Result<Classification, ClassifyError> {
    let trimmed = strip_code_fence(content.trim());
    let raw: RawClassification =
        serde_json::from_str(trimmed).map_err(|e| ClassifyError::InvalidResponse {
            reason: format!("{e}: {trimmed:.120}"),
        })?;

    Ok(Classification {
        category: raw.category,
        priority_score: raw.priority_score.clamp(1, 5),
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}

/// Strip a surrounding ```json ... ``` fence if present.
fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(s)
}

/// Spawn a background task that classifies unprocessed messages on a timer.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop.
pub fn spawn_classify_worker(
    db: Arc<dyn Database>,
    classifier: Arc<Classifier>,
    interval_secs: u64,
    batch_size: usize,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Classify worker started — sweeping every {interval_secs}s");

        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Classify worker shutting down");
                return;
            }

            classify_pending(&db, &classifier, batch_size).await;
        }
    });

    (handle, shutdown_flag)
}

/// Classify up to `batch_size` unprocessed messages.
async fn classify_pending(db: &Arc<dyn Database>, classifier: &Arc<Classifier>, batch_size: usize) {
    let pending = match db.list_unprocessed_messages(batch_size).await {
        Ok(messages) => messages,
        Err(e) => {
            error!(error = %e, "Failed to fetch unprocessed messages");
            return;
        }
    };

    if pending.is_empty() {
        return;
    }

    info!("Classifying {} pending message(s)", pending.len());

    for message in pending {
        match classifier.classify(&message).await {
            Ok(classification) => {
                if let Err(e) = db
                    .set_message_classification(
                        &message.id,
                        classification.priority_score,
                        classification.confidence,
                        &classification.category,
                    )
                    .await
                {
                    warn!(id = %message.id, error = %e, "Failed to store classification");
                }
            }
            Err(ClassifyError::Dispatch(ProviderError::NoProviderConfigured)) => {
                // Configuration problem, not a transient outage — the rest
                // of the batch would fail the same way.
                warn!("No active provider configured, skipping classification sweep");
                return;
            }
            Err(e) => {
                // Leave unprocessed — retried on the next tick.
                warn!(id = %message.id, error = %e, "Failed to classify message");
            }
        }
    }
}
