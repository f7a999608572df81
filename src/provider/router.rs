//! Provider router — priority-ordered failover across the provider pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{ProviderAttempt, ProviderClient, ProviderRequest, ProviderResult};
use crate::store::Database;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches requests to the highest-priority healthy provider.
///
/// Attempts within one dispatch are strictly sequential — failover is the
/// retry strategy, and racing candidates in parallel would burn quota on
/// providers that may still succeed. Each candidate gets an independent
/// `call_timeout`, so the worst-case dispatch latency is
/// `candidates × call_timeout`. Independent dispatches run concurrently;
/// counter updates are atomic per record at the store.
pub struct ProviderRouter {
    db: Arc<dyn Database>,
    client: Arc<dyn ProviderClient>,
    call_timeout: Duration,
}

impl ProviderRouter {
    pub fn new(db: Arc<dyn Database>, client: Arc<dyn ProviderClient>) -> Self {
        Self {
            db,
            client,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the per-candidate timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Send `request` to the first active provider that answers.
    ///
    /// Candidates are tried in (priority asc, name asc) order. Every attempt
    /// updates the candidate's health counters, success or failure. Fails
    /// with `NoProviderConfigured` when the pool is empty, or
    /// `AllProvidersExhausted` with the ordered failure list when every
    /// candidate failed.
    pub async fn dispatch(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResult, ProviderError> {
        let candidates = self.db.list_active_providers_by_priority().await?;
        if candidates.is_empty() {
            return Err(ProviderError::NoProviderConfigured);
        }

        let mut attempts: Vec<ProviderAttempt> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let started = Instant::now();
            let outcome = tokio::time::timeout(
                self.call_timeout,
                self.client.call(&candidate.name, &candidate.credential, request),
            )
            .await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            let reason = match outcome {
                Ok(Ok(response)) => {
                    // Counter bookkeeping must not turn a good answer into
                    // a failure.
                    if let Err(e) = self
                        .db
                        .record_provider_success(&candidate.name, elapsed_ms)
                        .await
                    {
                        warn!(provider = %candidate.name, error = %e, "Failed to record provider success");
                    }
                    debug!(provider = %candidate.name, elapsed_ms, "Provider call succeeded");
                    return Ok(ProviderResult {
                        provider: candidate.name,
                        response,
                        elapsed_ms,
                    });
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.call_timeout),
            };

            if let Err(e) = self
                .db
                .record_provider_failure(&candidate.name, elapsed_ms)
                .await
            {
                warn!(provider = %candidate.name, error = %e, "Failed to record provider failure");
            }
            warn!(
                provider = %candidate.name,
                elapsed_ms,
                reason = %reason,
                "Provider call failed, trying next candidate"
            );
            attempts.push(ProviderAttempt {
                provider: candidate.name,
                reason,
                elapsed_ms,
            });
        }

        Err(ProviderError::AllProvidersExhausted { attempts })
    }
}
