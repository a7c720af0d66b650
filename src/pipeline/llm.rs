//! Completion call: build the prompt and drive the backend with retry.
//!
//! This module owns retry, timeout and response parsing. Transport details
//! live in the [`CompletionBackend`] implementations in [`crate::backends`];
//! prompt text lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! [`RetryPolicy`] allows 3 attempts with a fixed 2 s pause between them and a
//! 60 s bound on each attempt. Every attempt runs as its own spawned task so a
//! slow endpoint never stalls the task that is serving the request; on timeout
//! the attempt task is aborted. A well-formed reply that lacks
//! `choices[0].message.content` is a protocol error and is not retried.

use crate::config::AssistantConfig;
use crate::error::{BackendError, TaError};
use crate::prompts::{user_message, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// One prompt sent to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub top_p: f32,
}

/// A chat-completion service.
///
/// Implementations return the raw response body. It is expected to look like
/// `{"choices": [{"message": {"content": "..."}}]}`; [`CompletionClient`]
/// does the extraction so that every backend shares one notion of a
/// malformed reply.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, BackendError>;
}

/// Attempt budget for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub backoff: Duration,
    /// Bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

/// Prompt builder plus retry loop around a [`CompletionBackend`].
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
    system_prompt: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &AssistantConfig) -> Self {
        Self {
            backend,
            policy: RetryPolicy::from_config(config),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Build the two-message prompt for `question` and `context`.
    pub fn build_request(&self, question: &str, context: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: self.system_prompt.clone(),
            user: user_message(question, context),
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    /// Ask the backend, retrying transient failures.
    pub async fn complete(&self, question: &str, context: &str) -> Result<String, TaError> {
        let request = self.build_request(question, context);
        let start = Instant::now();
        debug!(
            "Completion via {}: {} chars of prompt, model {}",
            self.backend.name(),
            request.user.len(),
            request.model
        );

        let mut last_err: Option<BackendError> = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                warn!(
                    "Completion retry {}/{} after {:?}",
                    attempt, self.policy.max_attempts, self.policy.backoff
                );
                sleep(self.policy.backoff).await;
            }

            match self.attempt(&request).await {
                Ok(body) => {
                    let answer = extract_answer(&body).ok_or_else(|| TaError::CompletionProtocol {
                        raw_response: body.to_string(),
                    })?;
                    debug!(
                        "Completion succeeded on attempt {} in {:?}",
                        attempt,
                        start.elapsed()
                    );
                    return Ok(answer);
                }
                Err(e) => {
                    warn!("Completion attempt {} failed: {}", attempt, e);
                    last_err = Some(e);
                }
            }
        }

        Err(TaError::CompletionUnavailable {
            attempts: self.policy.max_attempts,
            cause: last_err.unwrap_or_else(|| BackendError::Provider("no attempt was made".into())),
        })
    }

    /// Run one attempt on its own task, bounded by the per-attempt timeout.
    async fn attempt(&self, request: &CompletionRequest) -> Result<Value, BackendError> {
        let backend = Arc::clone(&self.backend);
        let request = request.clone();
        let mut task = tokio::spawn(async move { backend.complete(&request).await });

        match timeout(self.policy.attempt_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(BackendError::Provider(format!(
                "completion task failed: {join_err}"
            ))),
            Err(_) => {
                task.abort();
                Err(BackendError::Timeout {
                    secs: self.policy.attempt_timeout.as_secs(),
                })
            }
        }
    }
}

/// Pull `choices[0].message.content` out of a response body.
pub fn extract_answer(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}
