//! CLI binary for virtual-ta.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AssistantConfig` and either serves HTTP or answers one question.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use virtual_ta::pipeline::retrieve::create_schema;
use virtual_ta::{Assistant, AssistantConfig, BackendKind};

const AFTER_HELP: &str = r#"EXAMPLES:
  # Create an empty corpus table for the crawler to fill
  virtual-ta init-db --db tds_virtual_ta_fts.db

  # Serve the API on port 10000
  GITHUB_TOKEN=ghp_... virtual-ta serve --bind 0.0.0.0:10000

  # Ask one question from the terminal
  virtual-ta ask "What is a DataFrame?"

  # Ask with a screenshot
  virtual-ta ask "Solve this" --image question.png

  # Use an edgequake provider instead of GitHub Models
  virtual-ta --provider openai --model gpt-4.1-mini ask "Explain FTS5"

ENVIRONMENT VARIABLES:
  GITHUB_TOKEN          Credential for the OpenAI-compatible endpoint
  VTA_DB                Path to the FTS5 corpus
  VTA_ENDPOINT          OpenAI-compatible base URL
  VTA_MODEL             Model ID
  VTA_PROVIDER          edgequake provider (openai, anthropic, gemini, ollama)
  RUST_LOG              Overrides --verbose / --quiet
"#;

/// Course teaching assistant: FTS5 retrieval + LLM answers.
#[derive(Parser, Debug)]
#[command(
    name = "virtual-ta",
    version,
    about = "Answer course questions from a full-text corpus and an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    opts: Opts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "VTA_BIND", default_value = "0.0.0.0:10000")]
        bind: SocketAddr,
    },
    /// Answer one question and print the JSON response.
    Ask {
        /// The question text.
        question: String,

        /// Image file whose text is appended to the question.
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Create the FTS5 table if it does not exist.
    InitDb,
}

#[derive(Args, Debug)]
struct Opts {
    /// SQLite database with the FTS5 corpus.
    #[arg(long, global = true, env = "VTA_DB", default_value = virtual_ta::config::DEFAULT_DB_PATH)]
    db: PathBuf,

    /// FTS5 table name.
    #[arg(long, global = true, env = "VTA_TABLE", default_value = virtual_ta::config::DEFAULT_TABLE)]
    table: String,

    /// Passages retrieved per question.
    #[arg(long, global = true, env = "VTA_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Quote query terms so punctuation cannot break FTS5 syntax.
    #[arg(long, global = true, env = "VTA_ESCAPE_FTS")]
    escape_fts: bool,

    /// edgequake provider name; omit to use the OpenAI-compatible endpoint.
    #[arg(long, global = true, env = "VTA_PROVIDER")]
    provider: Option<String>,

    /// Model ID [default: openai/gpt-4.1]. Required with --provider.
    #[arg(long, global = true, env = "VTA_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, global = true, env = "VTA_ENDPOINT", default_value = virtual_ta::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Bearer credential for the endpoint.
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    api_key: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "VTA_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "VTA_TEMPERATURE", default_value_t = 1.0)]
    temperature: f32,

    /// Completion attempts per question.
    #[arg(long, global = true, env = "VTA_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Pause between attempts in milliseconds.
    #[arg(long, global = true, env = "VTA_RETRY_BACKOFF_MS", default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// Per-attempt completion timeout in seconds.
    #[arg(long, global = true, env = "VTA_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Tesseract executable.
    #[arg(long, global = true, env = "VTA_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Tesseract language(s), e.g. eng or eng+fra.
    #[arg(long, global = true, env = "VTA_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "VTA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "VTA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.opts.verbose {
        "debug"
    } else if cli.opts.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::InitDb => {
            create_schema(&cli.opts.db, &cli.opts.table)
                .with_context(|| format!("Failed to create schema in {:?}", cli.opts.db))?;
            if !cli.opts.quiet {
                eprintln!("✔ table '{}' ready in {}", cli.opts.table, cli.opts.db.display());
            }
        }
        Command::Serve { bind } => {
            let config = build_config(&cli.opts).await?;
            let assistant =
                Arc::new(Assistant::from_config(&config).context("Failed to build pipeline")?);
            virtual_ta::server::serve(assistant, bind)
                .await
                .context("Server failed")?;
        }
        Command::Ask { ref question, ref image } => {
            let config = build_config(&cli.opts).await?;
            let assistant = Assistant::from_config(&config).context("Failed to build pipeline")?;

            let mut payload = serde_json::json!({ "question": question });
            if let Some(path) = image {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read image {:?}", path))?;
                payload["image"] = STANDARD.encode(bytes).into();
            }

            let spinner = (!cli.opts.quiet).then(thinking_spinner);
            let result = assistant.answer_value(payload).await;
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }

            let response = result.context("Failed to answer")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&response).context("Failed to serialise answer")?
            );
        }
    }

    Ok(())
}

fn thinking_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message("Thinking…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Map CLI args to `AssistantConfig`.
async fn build_config(opts: &Opts) -> Result<AssistantConfig> {
    let mut builder = AssistantConfig::builder()
        .db_path(&opts.db)
        .table_name(&opts.table)
        .top_k(opts.top_k)
        .escape_fts_query(opts.escape_fts)
        .endpoint(&opts.endpoint)
        .temperature(opts.temperature)
        .max_attempts(opts.max_attempts)
        .retry_backoff_ms(opts.retry_backoff_ms)
        .api_timeout_secs(opts.api_timeout)
        .tesseract_cmd(&opts.tesseract)
        .tesseract_lang(&opts.ocr_lang);

    if let Some(ref model) = opts.model {
        builder = builder.model(model);
    }
    if let Some(ref name) = opts.provider {
        builder = builder.backend(BackendKind::Edgequake {
            provider_name: name.clone(),
        });
    }
    if let Some(ref key) = opts.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref path) = opts.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
