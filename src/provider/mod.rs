//! Provider pool — ranked, health-tracked external intelligence backends.
//!
//! Callers hand the router an opaque request; the router picks an active
//! provider by priority, invokes it through the `ProviderClient` abstraction,
//! records the outcome on the provider's health counters, and fails over to
//! the next candidate on error.

pub mod http;
pub mod router;

pub use http::HttpProviderClient;
pub use router::ProviderRouter;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;

use crate::error::ProviderError;

/// Opaque payload destined for whichever provider is chosen.
/// Chat-completion shaped, which is what every configured backend speaks.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Raw provider reply.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
}

/// Outcome of a successful dispatch: which provider answered, and how fast.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub provider: String,
    pub response: ProviderResponse,
    pub elapsed_ms: f64,
}

/// One failed attempt, recorded in the order tried. Carried by
/// `ProviderError::AllProvidersExhausted` for diagnostics.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub reason: String,
    pub elapsed_ms: f64,
}

/// External call abstraction — one bounded attempt against one backend.
///
/// The credential never travels further than this call.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(
        &self,
        name: &str,
        credential: &SecretString,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError>;
}
