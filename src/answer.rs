//! The request-answering entry point.
//!
//! [`Assistant`] owns one instance of every stage and is shared by all
//! in-flight requests (the HTTP layer wraps it in an `Arc`). Within a request
//! the stages run strictly in order:
//!
//! ```text
//! sanitize → extract-if-image → retrieve → complete → compose
//! ```
//!
//! Only two steps leave the request task: recognition (blocking pool) and each
//! completion attempt (spawned task). Everything else runs inline.

use crate::backends::resolve_backend;
use crate::config::AssistantConfig;
use crate::error::TaError;
use crate::output::AnswerResponse;
use crate::pipeline::compose::compose;
use crate::pipeline::encode::decode_image_field;
use crate::pipeline::llm::{CompletionBackend, CompletionClient};
use crate::pipeline::ocr::{Recognizer, TesseractCli, TextExtractionCache};
use crate::pipeline::retrieve::{join_context, ContextRetriever, SearchStore, SqliteFtsStore};
use crate::pipeline::sanitize::{sanitize, sanitize_body, SanitizedRequest};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The assembled question-answering pipeline.
pub struct Assistant {
    extraction: TextExtractionCache,
    retriever: ContextRetriever,
    completion: CompletionClient,
}

impl Assistant {
    /// Build the production pipeline: SQLite FTS5 store, tesseract
    /// recognizer, and the backend selected by `config`.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, TaError> {
        let backend = resolve_backend(config)?;
        let store = SqliteFtsStore::new(&config.db_path, &config.table_name)
            .with_escaped_queries(config.escape_fts_query);
        let recognizer = TesseractCli::new(&config.tesseract_cmd, &config.tesseract_lang);
        Ok(Self::with_parts(
            config,
            backend,
            Arc::new(store),
            Arc::new(recognizer),
        ))
    }

    /// Build a pipeline from explicit collaborators.
    pub fn with_parts(
        config: &AssistantConfig,
        backend: Arc<dyn CompletionBackend>,
        store: Arc<dyn SearchStore>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            extraction: TextExtractionCache::new(recognizer),
            retriever: ContextRetriever::new(store, config.top_k),
            completion: CompletionClient::new(backend, config),
        }
    }

    /// Answer a raw request body.
    pub async fn answer_body(&self, body: &[u8]) -> Result<AnswerResponse, TaError> {
        let request = sanitize_body(body)?;
        self.answer(request).await
    }

    /// Answer an already-decoded JSON payload.
    pub async fn answer_value(&self, payload: Value) -> Result<AnswerResponse, TaError> {
        let request = sanitize(payload)?;
        self.answer(request).await
    }

    /// Answer a sanitised request.
    pub async fn answer(&self, request: SanitizedRequest) -> Result<AnswerResponse, TaError> {
        let start = Instant::now();
        if request.question.is_empty() {
            return Err(TaError::MissingQuestion);
        }

        let mut question = request.question;

        // ── Step 1: Extract image text ───────────────────────────────────
        if let Some(field) = request.image.as_deref().filter(|f| !f.is_empty()) {
            let bytes = decode_image_field(field)?;
            let extracted = self.extraction.extract(bytes).await?;
            debug!("Extracted {} chars of image text", extracted.len());
            question.push('\n');
            question.push_str(&extracted);
        }

        // ── Step 2: Retrieve context, degrading to none ──────────────────
        let rows = match self.retriever.retrieve(&question) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Retrieval failed, answering without context: {}", e);
                Vec::new()
            }
        };
        let context = join_context(&rows);

        // ── Step 3: Complete ─────────────────────────────────────────────
        let answer = self.completion.complete(&question, &context).await?;

        // ── Step 4: Compose ──────────────────────────────────────────────
        let response = compose(answer, &rows);
        info!(
            "Answered in {}ms with {} links",
            start.elapsed().as_millis(),
            response.links.len()
        );
        Ok(response)
    }

    /// The shared OCR cache, for inspection.
    pub fn extraction_cache(&self) -> &TextExtractionCache {
        &self.extraction
    }
}
