//! Error types for the virtual-ta library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`TaError`] — **Fatal**: the request cannot be answered (unparseable
//!   payload, missing question, undecodable image, completion service down).
//!   Returned as `Err(TaError)` from [`crate::answer::Assistant::answer`].
//!   [`TaError::kind`] says whether the caller or the server is to blame.
//!
//! * [`RetrievalError`] — **Absorbed**: the search store failed. The pipeline
//!   logs it and continues with an empty context instead of failing the request.
//!
//! * [`BackendError`] — **Per-attempt**: one completion attempt failed. The
//!   retry loop in [`crate::pipeline::llm`] collects these and only surfaces
//!   the last one, wrapped in [`TaError::CompletionUnavailable`].

use thiserror::Error;

/// Who is responsible for a fatal error.
///
/// The HTTP layer maps `Client` to 400 and `Server` to 502.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The payload was wrong; retrying the same request will not help.
    Client,
    /// An upstream collaborator failed.
    Server,
}

/// All fatal errors returned by the virtual-ta library.
#[derive(Debug, Error)]
pub enum TaError {
    // ── Client errors ─────────────────────────────────────────────────────
    /// The outer request body is not structured data.
    #[error("Invalid JSON body: {reason}")]
    MalformedInput { reason: String },

    /// The sanitized payload carries no question.
    #[error("Missing 'question'")]
    MissingQuestion,

    /// The image field is not valid base64 or not a decodable image.
    #[error("Image decoding failed: {reason}")]
    ImageDecode { reason: String },

    // ── Completion errors ─────────────────────────────────────────────────
    /// Every completion attempt failed.
    #[error("LLM API call failed after {attempts} attempts: {cause}")]
    CompletionUnavailable {
        attempts: u32,
        #[source]
        cause: BackendError,
    },

    /// The completion service answered, but without `choices[0].message.content`.
    #[error("LLM API returned an unexpected response: {raw_response}")]
    CompletionProtocol { raw_response: String },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// The configured backend cannot be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaError {
    /// Classify the error for the transport layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaError::MalformedInput { .. } | TaError::MissingQuestion | TaError::ImageDecode { .. } => {
                ErrorKind::Client
            }
            TaError::CompletionUnavailable { .. }
            | TaError::CompletionProtocol { .. }
            | TaError::ProviderNotConfigured { .. }
            | TaError::InvalidConfig(_)
            | TaError::Internal(_) => ErrorKind::Server,
        }
    }
}

/// A search-store failure. Never fatal to a request.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// The store file could not be opened.
    #[error("search store unavailable at '{path}': {detail}")]
    Unavailable { path: String, detail: String },

    /// The query was rejected (FTS syntax error, missing table, …).
    #[error("search query failed: {0}")]
    Query(String),
}

/// A single failed completion attempt.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Connection, TLS or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The attempt did not finish within the per-attempt bound.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider library reported an error.
    #[error("provider error: {0}")]
    Provider(String),
}
