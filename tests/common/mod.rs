//! Shared in-process collaborators for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use virtual_ta::{
    Assistant, AssistantConfig, BackendError, CompletionBackend, CompletionRequest, ContextRow,
    Recognizer, RetrievalError, SearchStore, TaError,
};

pub fn reply(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

/// Completion backend that replays a script and records every prompt.
pub struct ScriptedBackend {
    outcomes: Mutex<VecDeque<Result<Value, BackendError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(outcomes: Vec<Result<Value, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(content: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply(content))])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".into())))
    }
}

/// Search store returning fixed rows and recording queries.
pub struct FixedStore {
    rows: Result<Vec<ContextRow>, RetrievalError>,
    pub queries: Mutex<Vec<String>>,
}

impl FixedStore {
    pub fn rows(rows: Vec<ContextRow>) -> Arc<Self> {
        Arc::new(Self {
            rows: Ok(rows),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Err(RetrievalError::Query("fts5: syntax error near \"?\"".into())),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl SearchStore for FixedStore {
    fn query(&self, text: &str, limit: usize) -> Result<Vec<ContextRow>, RetrievalError> {
        self.queries.lock().unwrap().push(text.to_string());
        self.rows
            .clone()
            .map(|rows| rows.into_iter().take(limit).collect())
    }
}

/// Recognizer returning a fixed text and counting calls.
pub struct FixedRecognizer {
    text: String,
    pub calls: AtomicUsize,
}

impl FixedRecognizer {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for FixedRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, TaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Config with zero backoff so failure tests stay fast.
pub fn fast_config() -> AssistantConfig {
    AssistantConfig::builder()
        .retry_backoff_ms(0)
        .build()
        .expect("valid config")
}

pub fn assistant(
    backend: Arc<ScriptedBackend>,
    store: Arc<FixedStore>,
    recognizer: Arc<FixedRecognizer>,
) -> Assistant {
    Assistant::with_parts(&fast_config(), backend, store, recognizer)
}
