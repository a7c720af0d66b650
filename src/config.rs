//! Configuration types for the answering pipeline.
//!
//! Every knob lives in [`AssistantConfig`], built via its
//! [`AssistantConfigBuilder`]. The struct is cheap to clone and is shared by
//! every in-flight request through the [`crate::answer::Assistant`].

use crate::error::TaError;
use crate::pipeline::llm::CompletionBackend;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default completion endpoint (GitHub Models, OpenAI-compatible).
pub const DEFAULT_ENDPOINT: &str = "https://models.github.ai/inference";

/// Default model served by [`DEFAULT_ENDPOINT`].
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1";

/// Default SQLite database holding the FTS5 corpus.
pub const DEFAULT_DB_PATH: &str = "tds_virtual_ta_fts.db";

/// Default FTS5 table name.
pub const DEFAULT_TABLE: &str = "content_fts";

/// Which completion backend answers questions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// POST `{endpoint}/chat/completions` with a bearer token. (default)
    #[default]
    OpenAiCompatible,
    /// A named `edgequake-llm` provider ("openai", "anthropic", "ollama", …).
    Edgequake { provider_name: String },
}

/// Configuration for the question-answering pipeline.
///
/// # Example
/// ```rust
/// use virtual_ta::AssistantConfig;
///
/// let config = AssistantConfig::builder()
///     .db_path("corpus.db")
///     .top_k(5)
///     .model("openai/gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.top_k, 5);
/// ```
#[derive(Clone)]
pub struct AssistantConfig {
    /// SQLite file with the FTS5 corpus. Default: `tds_virtual_ta_fts.db`.
    pub db_path: PathBuf,

    /// FTS5 table name. Default: `content_fts`.
    ///
    /// Interpolated into SQL, so the builder only accepts `[A-Za-z0-9_]`.
    pub table_name: String,

    /// Passages retrieved per question. Default: 3.
    pub top_k: usize,

    /// Quote every query term before handing it to FTS5. Default: false.
    ///
    /// With the default the merged question goes to `MATCH` verbatim and any
    /// FTS syntax error simply yields an empty context.
    pub escape_fts_query: bool,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Backend selection. Ignored when `backend_override` is set.
    pub backend: BackendKind,

    /// Pre-constructed backend. Takes precedence over `backend`.
    pub backend_override: Option<Arc<dyn CompletionBackend>>,

    /// Model identifier sent to the backend. Default: `openai/gpt-4.1`.
    pub model: String,

    /// Base URL of the OpenAI-compatible endpoint.
    pub endpoint: String,

    /// Bearer credential for the OpenAI-compatible endpoint.
    pub api_key: Option<String>,

    /// Sampling temperature. Default: 1.0.
    pub temperature: f32,

    /// Nucleus sampling. Default: 1.0.
    pub top_p: f32,

    /// Total completion attempts, including the first. Default: 3.
    pub max_attempts: u32,

    /// Fixed pause between completion attempts in milliseconds. Default: 2000.
    pub retry_backoff_ms: u64,

    /// Per-attempt completion timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Tesseract executable. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// Tesseract language(s), e.g. `eng` or `eng+fra`. Default: `eng`.
    pub tesseract_lang: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            table_name: DEFAULT_TABLE.to_string(),
            top_k: 3,
            escape_fts_query: false,
            system_prompt: None,
            backend: BackendKind::default(),
            backend_override: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            temperature: 1.0,
            top_p: 1.0,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            api_timeout_secs: 60,
            tesseract_cmd: "tesseract".to_string(),
            tesseract_lang: "eng".to_string(),
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("db_path", &self.db_path)
            .field("table_name", &self.table_name)
            .field("top_k", &self.top_k)
            .field("escape_fts_query", &self.escape_fts_query)
            .field("backend", &self.backend)
            .field(
                "backend_override",
                &self.backend_override.as_ref().map(|_| "<dyn CompletionBackend>"),
            )
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl AssistantConfig {
    /// Create a new builder for `AssistantConfig`.
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`AssistantConfig`].
#[derive(Debug)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.config.table_name = name.into();
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn escape_fts_query(mut self, v: bool) -> Self {
        self.config.escape_fts_query = v;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn backend_override(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend_override = Some(backend);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn tesseract_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_lang = lang.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssistantConfig, TaError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(TaError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if c.top_k == 0 {
            return Err(TaError::InvalidConfig("top_k must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(TaError::InvalidConfig("api_timeout_secs must be ≥ 1".into()));
        }
        if c.table_name.is_empty()
            || !c
                .table_name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(TaError::InvalidConfig(format!(
                "table name must match [A-Za-z0-9_]+, got '{}'",
                c.table_name
            )));
        }
        if let BackendKind::Edgequake { ref provider_name } = c.backend {
            if c.model == DEFAULT_MODEL {
                return Err(TaError::InvalidConfig(format!(
                    "provider '{provider_name}' needs an explicit model; \
                     '{DEFAULT_MODEL}' is a GitHub Models id"
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service() {
        let c = AssistantConfig::default();
        assert_eq!(c.top_k, 3);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_backoff(), Duration::from_secs(2));
        assert_eq!(c.attempt_timeout(), Duration::from_secs(60));
        assert_eq!(c.table_name, "content_fts");
        assert_eq!(c.backend, BackendKind::OpenAiCompatible);
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = AssistantConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn rejects_injectable_table_name() {
        let err = AssistantConfig::builder()
            .table_name("content; DROP TABLE x")
            .build()
            .unwrap_err();
        assert!(matches!(err, TaError::InvalidConfig(_)));
    }

    #[test]
    fn named_provider_needs_its_own_model() {
        let edgequake = || BackendKind::Edgequake {
            provider_name: "anthropic".into(),
        };

        let err = AssistantConfig::builder()
            .backend(edgequake())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("explicit model"));

        let c = AssistantConfig::builder()
            .backend(edgequake())
            .model("claude-sonnet-4-5")
            .build()
            .unwrap();
        assert_eq!(c.model, "claude-sonnet-4-5");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = AssistantConfig::builder().api_key("ghp_secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("ghp_secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn temperature_is_clamped() {
        let c = AssistantConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }
}
