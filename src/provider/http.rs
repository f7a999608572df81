//! HTTP provider client — chat-completion calls against the configured
//! backends (groq, openai, gemini), all of which speak the OpenAI-compatible
//! wire format.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::error::ProviderError;
use crate::provider::{ProviderClient, ProviderRequest, ProviderResponse};

/// Endpoint and default model per known backend name.
fn backend(name: &str) -> Option<(&'static str, &'static str)> {
    match name {
        "groq" => Some((
            "https://api.groq.com/openai/v1/chat/completions",
            "llama-3.3-70b-versatile",
        )),
        "openai" => Some((
            "https://api.openai.com/v1/chat/completions",
            "gpt-4o-mini",
        )),
        "gemini" => Some((
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
            "gemini-2.0-flash",
        )),
        _ => None,
    }
}

/// `ProviderClient` over reqwest. The router owns the per-call deadline, so
/// no timeout is configured here.
pub struct HttpProviderClient {
    http: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn call(
        &self,
        name: &str,
        credential: &SecretString,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let (url, model) = backend(name).ok_or_else(|| ProviderError::CallFailed {
            provider: name.to_string(),
            reason: "unknown provider backend".to_string(),
        })?;

        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::CallFailed {
                provider: name.to_string(),
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            // Rejected credential, rate limit, server error — all failures
            // for routing purposes.
            return Err(ProviderError::CallFailed {
                provider: name.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| ProviderError::CallFailed {
                provider: name.to_string(),
                reason: format!("invalid response body: {e}"),
            })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::CallFailed {
                provider: name.to_string(),
                reason: "response missing message content".to_string(),
            })?
            .to_string();

        Ok(ProviderResponse { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_backends_resolve() {
        for name in ["groq", "openai", "gemini"] {
            let (url, model) = backend(name).unwrap();
            assert!(url.starts_with("https://"));
            assert!(!model.is_empty());
        }
    }

    #[test]
    fn unknown_backend_does_not_resolve() {
        assert!(backend("cohere").is_none());
        assert!(backend("").is_none());
    }

    #[tokio::test]
    async fn unknown_backend_fails_without_network() {
        let client = HttpProviderClient::new();
        let err = client
            .call(
                "cohere",
                &SecretString::from("sk-x"),
                &ProviderRequest {
                    system: "s".into(),
                    user: "u".into(),
                    max_tokens: 16,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::CallFailed { .. }));
    }
}
