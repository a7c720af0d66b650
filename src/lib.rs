//! # virtual-ta
//!
//! A teaching-assistant service for a course: it answers a student's question
//! (optionally with a screenshot) from a full-text course corpus and an LLM,
//! and returns the answer with links to the passages it drew on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Sanitize  decode JSON, neutralise `{{ }}` template probes
//!  ├─ 2. OCR       digest-keyed single-flight cache over tesseract (spawn_blocking)
//!  ├─ 3. Retrieve  top-k FTS5 passages; store errors degrade to no context
//!  ├─ 4. Complete  chat completion, 3 attempts, 2 s backoff, 60 s per attempt
//!  └─ 5. Compose   answer + links with 60-char excerpts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use virtual_ta::{Assistant, AssistantConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AssistantConfig::builder()
//!         .db_path("tds_virtual_ta_fts.db")
//!         .api_key(std::env::var("GITHUB_TOKEN")?)
//!         .build()?;
//!     let assistant = Assistant::from_config(&config)?;
//!     let reply = assistant
//!         .answer_body(br#"{"question": "What is a DataFrame?"}"#)
//!         .await?;
//!     println!("{}", reply.answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `virtual-ta` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod answer;
pub mod backends;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use answer::Assistant;
pub use config::{AssistantConfig, AssistantConfigBuilder, BackendKind};
pub use error::{BackendError, ErrorKind, RetrievalError, TaError};
pub use output::{AnswerResponse, ContextRow, Link};
pub use pipeline::llm::{CompletionBackend, CompletionRequest, RetryPolicy};
pub use pipeline::ocr::Recognizer;
pub use pipeline::retrieve::SearchStore;
