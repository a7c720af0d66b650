//! Completion backends and backend selection.
//!
//! Two transports implement [`CompletionBackend`]:
//!
//! * [`OpenAiCompatBackend`] — plain `reqwest` against any
//!   `/chat/completions` endpoint (GitHub Models by default). The raw body is
//!   passed back untouched so a malformed reply can be reported verbatim.
//! * [`EdgequakeBackend`] — any provider `edgequake-llm` knows about. Its typed
//!   reply is re-shaped into the `choices` layout the client expects.
//!
//! Which one runs is a configuration choice ([`BackendKind`]), not a code fork.

use crate::config::{AssistantConfig, BackendKind};
use crate::error::{BackendError, TaError};
use crate::pipeline::llm::{CompletionBackend, CompletionRequest};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Longest error body kept in a [`BackendError::Status`].
const MAX_ERROR_BODY: usize = 2000;

/// Bearer-authenticated OpenAI-compatible chat endpoint.
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenAiCompatBackend {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, TaError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("virtual-ta/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TaError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, BackendError> {
        let body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "top_p": request.top_p,
        });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(text, MAX_ERROR_BODY),
            });
        }

        // A 2xx body that is not JSON still goes back to the client, which
        // reports it as a protocol error with the text intact.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Adapter over an `edgequake-llm` provider.
pub struct EdgequakeBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl EdgequakeBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, BackendError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.user.as_str()),
        ];
        let options = chat_options(request);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BackendError::Provider(e.to_string()))?;

        Ok(json!({
            "choices": [{"message": {"role": "assistant", "content": response.content}}],
            "usage": {
                "prompt_tokens": response.prompt_tokens,
                "completion_tokens": response.completion_tokens,
            },
        }))
    }
}

/// Sampling options forwarded to an `edgequake-llm` provider.
fn chat_options(request: &CompletionRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        top_p: Some(request.top_p),
        ..Default::default()
    }
}

/// Resolve the backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend_override`) — used as-is. Tests and
///    embedders inject their own here.
/// 2. **OpenAI-compatible** — needs `config.api_key`; the CLI fills it from
///    `GITHUB_TOKEN`.
/// 3. **Named edgequake provider** — [`ProviderFactory`] reads the provider's
///    own API-key variable (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
pub fn resolve_backend(config: &AssistantConfig) -> Result<Arc<dyn CompletionBackend>, TaError> {
    if let Some(ref backend) = config.backend_override {
        return Ok(Arc::clone(backend));
    }

    match &config.backend {
        BackendKind::OpenAiCompatible => {
            let key = config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| TaError::ProviderNotConfigured {
                    provider: "openai-compatible".into(),
                    hint: format!(
                        "No API key for {}.\nSet GITHUB_TOKEN or pass --api-key.",
                        config.endpoint
                    ),
                })?;
            info!("Using OpenAI-compatible endpoint {}", config.endpoint);
            Ok(Arc::new(OpenAiCompatBackend::new(&config.endpoint, key)?))
        }
        BackendKind::Edgequake { provider_name } => {
            let provider = ProviderFactory::create_llm_provider(provider_name, &config.model)
                .map_err(|e| TaError::ProviderNotConfigured {
                    provider: provider_name.clone(),
                    hint: format!("{e}"),
                })?;
            info!("Using {} provider, model {}", provider_name, config.model);
            Ok(Arc::new(EdgequakeBackend::new(provider, provider_name.clone())))
        }
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_compat_requires_key() {
        let config = AssistantConfig::default();
        let err = resolve_backend(&config).err().expect("missing key must fail");
        assert!(matches!(err, TaError::ProviderNotConfigured { .. }));
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let config = AssistantConfig::builder().api_key("").build().unwrap();
        assert!(resolve_backend(&config).is_err());
    }

    #[test]
    fn openai_compat_url_is_normalised() {
        let backend = OpenAiCompatBackend::new("https://example.test/inference/", "k").unwrap();
        assert_eq!(backend.url, "https://example.test/inference/chat/completions");
    }

    #[test]
    fn override_wins() {
        let backend: Arc<dyn CompletionBackend> =
            Arc::new(OpenAiCompatBackend::new("http://localhost:1", "k").unwrap());
        let config = AssistantConfig::builder()
            .backend_override(Arc::clone(&backend))
            .build()
            .unwrap();
        let resolved = resolve_backend(&config).unwrap();
        assert_eq!(resolved.name(), "openai-compatible");
        assert!(Arc::ptr_eq(&resolved, &backend));
    }

    #[test]
    fn chat_options_carry_sampling_parameters() {
        let request = CompletionRequest {
            model: "gpt-4.1-mini".into(),
            system: "sys".into(),
            user: "q".into(),
            temperature: 0.2,
            top_p: 0.9,
        };
        let opts = chat_options(&request);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.top_p, Some(0.9));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".into(), 2), "h…");
        assert_eq!(truncate("short".into(), 10), "short");
    }
}
