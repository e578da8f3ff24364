//! CLI binary for edgequake-essay-eval.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `EvalConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_essay_eval::{
    ask, evaluate_essay, extract, revise_evaluation, revise_evaluation_text, write_text,
    CredentialResolver, EnvSource, EvalConfig, EvalConfigBuilder, FileSource, InteractiveSource,
    ModelResponse, PageSeparator, PromptTemplate, TemplateKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # General rubric, printed to stdout
  essay-eval evaluate essay.pdf

  # Strict technical rubric, saved to a file, with the stated score
  essay-eval evaluate --rubric strict essay.pdf -o evaluation.txt --score

  # Your own rubric (must contain {essay})
  essay-eval evaluate --template rubric.txt essay.pdf

  # Ask the model to reconsider a saved evaluation
  essay-eval revise evaluation.pdf --opinion "I would rate the essay a 8 out of 10."
  essay-eval revise --evaluation-text evaluation.txt --opinion-file opinion.txt

  # Connectivity check
  essay-eval ask "What is the weather in Taiwan like in June?"

  # Show what the model would see (no API key needed)
  essay-eval extract essay.pdf

ENVIRONMENT VARIABLES:
  NVIDIA_API_KEY          API key (starts with nvapi-); prompted for when unset
  ESSAY_EVAL_MODEL        Override model ID (default meta/llama2-70b)
  ESSAY_EVAL_BASE_URL     Override API root (default https://integrate.api.nvidia.com/v1)
  RUST_LOG                Override log filter (e.g. edgequake_essay_eval=debug)

  A .env file in the working directory is loaded first.
"#;

/// Evaluate PDF essays with an NVIDIA-hosted LLM.
#[derive(Parser, Debug)]
#[command(
    name = "essay-eval",
    version,
    about = "Evaluate PDF essays with an NVIDIA-hosted LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Remote model ID.
    #[arg(long, global = true, env = "ESSAY_EVAL_MODEL")]
    model: Option<String>,

    /// Max output tokens (default 1000; 500 for `ask`).
    #[arg(long, global = true, env = "ESSAY_EVAL_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Sampling temperature 0.0–2.0 (default 0 for evaluations, endpoint default for `ask`).
    #[arg(long, global = true, env = "ESSAY_EVAL_TEMPERATURE")]
    temperature: Option<f32>,

    /// API root; `/chat/completions` is appended.
    #[arg(long, global = true, env = "ESSAY_EVAL_BASE_URL")]
    base_url: Option<String>,

    /// Per-request timeout in milliseconds (default: none).
    #[arg(long, global = true, env = "ESSAY_EVAL_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Retries on network errors, timeouts, 429 and 5xx (default: 0).
    #[arg(long, global = true, env = "ESSAY_EVAL_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Page separator when flattening PDFs: none, newline, or a custom string.
    #[arg(long, global = true, env = "ESSAY_EVAL_SEPARATOR", default_value = "none")]
    separator: String,

    /// Read the API key from the first line of this file.
    #[arg(long, global = true, env = "ESSAY_EVAL_API_KEY_FILE")]
    api_key_file: Option<PathBuf>,

    /// Never prompt for the API key; fail if none is configured.
    #[arg(long, global = true, env = "ESSAY_EVAL_NO_PROMPT")]
    no_prompt: bool,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, global = true, env = "ESSAY_EVAL_OUTPUT")]
    output: Option<PathBuf>,

    /// Output structured JSON instead of plain text.
    #[arg(long, global = true, env = "ESSAY_EVAL_JSON")]
    json: bool,

    /// Also report the score stated in the evaluation, if one can be found.
    #[arg(long, global = true)]
    score: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "ESSAY_EVAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true, env = "ESSAY_EVAL_QUIET")]
    quiet: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "ESSAY_EVAL_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the essay in a PDF.
    Evaluate {
        /// Essay PDF.
        pdf: PathBuf,

        /// Rubric to grade against.
        #[arg(long, value_enum, default_value = "general")]
        rubric: RubricArg,

        /// Text file with a custom rubric containing `{essay}`.
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Revise a prior evaluation in light of a human teacher's opinion.
    Revise {
        /// PDF holding the prior evaluation.
        #[arg(required_unless_present = "evaluation_text", conflicts_with = "evaluation_text")]
        evaluation_pdf: Option<PathBuf>,

        /// Plain-text file holding the prior evaluation.
        #[arg(long)]
        evaluation_text: Option<PathBuf>,

        /// The teacher's opinion.
        #[arg(long, required_unless_present = "opinion_file", conflicts_with = "opinion_file")]
        opinion: Option<String>,

        /// File holding the teacher's opinion.
        #[arg(long)]
        opinion_file: Option<PathBuf>,

        /// Text file with a custom revision prompt containing
        /// `{llm_evaluation}` and `{human_opinion}`.
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Send a free-form question (connectivity check).
    Ask {
        question: String,
    },

    /// Print the text extracted from a PDF. Needs no API key.
    Extract {
        pdf: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RubricArg {
    General,
    Strict,
}

impl From<RubricArg> for TemplateKind {
    fn from(v: RubricArg) -> Self {
        match v {
            RubricArg::General => TemplateKind::General,
            RubricArg::Strict => TemplateKind::Strict,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the spinner active only warnings get through; the spinner already
    // says what is happening.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        // ── Extract-only mode ────────────────────────────────────────────
        Command::Extract { pdf } => {
            let config = base_builder(&cli, EvalConfig::default())
                .build()
                .context("Invalid configuration")?;
            let document = extract(pdf, &config)
                .await
                .with_context(|| format!("Failed to extract text from {}", pdf.display()))?;

            let json = cli
                .json
                .then(|| serde_json::to_value(&document))
                .transpose()
                .context("Failed to serialise output")?;
            emit(&cli, &document.text, json).await?;

            if !cli.quiet {
                let empty = document.empty_pages();
                eprintln!(
                    "{} {} pages, {} chars",
                    green("✔"),
                    document.page_count(),
                    document.text.len()
                );
                if !empty.is_empty() {
                    eprintln!(
                        "{} pages without text: {:?}",
                        yellow("⚠"),
                        empty
                    );
                }
            }
        }

        // ── Free-form question ───────────────────────────────────────────
        Command::Ask { question } => {
            let config = model_config(&cli, EvalConfig::smoke_test(), None).await?;
            let spinner = spinner(show_progress, "Waiting for the model…");
            let result = ask(question, &config).await;
            spinner.finish_and_clear();
            let response = result.context("Request failed")?;
            report(&cli, &response, None).await?;
        }

        // ── Essay evaluation ─────────────────────────────────────────────
        Command::Evaluate {
            pdf,
            rubric,
            template,
        } => {
            let kind = TemplateKind::from(*rubric);
            let custom = load_template(kind, template.as_deref()).await?;
            let config = model_config(&cli, EvalConfig::default(), custom).await?;

            let spinner = spinner(
                show_progress,
                &format!("Evaluating {} ({kind} rubric)…", pdf.display()),
            );
            let result = evaluate_essay(pdf, kind, &config).await;
            spinner.finish_and_clear();
            let evaluation = result.context("Evaluation failed")?;

            if !evaluation.empty_pages.is_empty() && !cli.quiet {
                eprintln!(
                    "{} {} of {} pages had no extractable text (scanned?): {:?}",
                    yellow("⚠"),
                    evaluation.empty_pages.len(),
                    evaluation.source_pages,
                    evaluation.empty_pages
                );
            }
            let json = serde_json::to_value(&evaluation).context("Failed to serialise output")?;
            report(&cli, &evaluation.response, Some(json)).await?;
        }

        // ── Revision ─────────────────────────────────────────────────────
        Command::Revise {
            evaluation_pdf,
            evaluation_text,
            opinion,
            opinion_file,
            template,
        } => {
            let human_opinion = match (opinion, opinion_file) {
                (Some(text), _) => text.clone(),
                (None, Some(path)) => read_text(path, "opinion").await?,
                (None, None) => anyhow::bail!("Pass --opinion or --opinion-file"),
            };
            let custom = load_template(TemplateKind::Revision, template.as_deref()).await?;
            let config = model_config(&cli, EvalConfig::default(), custom).await?;

            let spinner = spinner(show_progress, "Asking the model to reconsider…");
            let result = match (evaluation_pdf, evaluation_text) {
                (Some(pdf), _) => revise_evaluation(pdf, &human_opinion, &config).await,
                (None, Some(path)) => {
                    let prior = read_text(path, "evaluation").await?;
                    revise_evaluation_text(&prior, &human_opinion, &config).await
                }
                (None, None) => {
                    spinner.finish_and_clear();
                    anyhow::bail!("Pass an evaluation PDF or --evaluation-text");
                }
            };
            spinner.finish_and_clear();
            let evaluation = result.context("Revision failed")?;
            let json = serde_json::to_value(&evaluation).context("Failed to serialise output")?;
            report(&cli, &evaluation.response, Some(json)).await?;
        }
    }

    Ok(())
}

// ── Config ───────────────────────────────────────────────────────────────────

/// Apply the flags shared by every subcommand on top of `base`.
fn base_builder(cli: &Cli, base: EvalConfig) -> EvalConfigBuilder {
    let mut builder = EvalConfigBuilder::from_config(base)
        .max_retries(cli.max_retries)
        .page_separator(parse_separator(&cli.separator));

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ms) = cli.timeout_ms {
        builder = builder.timeout_ms(ms);
    }
    builder
}

/// Config for commands that talk to the model: flags plus a resolved key.
async fn model_config(
    cli: &Cli,
    base: EvalConfig,
    template: Option<PromptTemplate>,
) -> Result<EvalConfig> {
    let mut builder = base_builder(cli, base);
    if let Some(template) = template {
        builder = builder.template(template);
    }

    let resolver = credential_resolver(cli);
    // The interactive source blocks on the terminal.
    let credential = tokio::task::block_in_place(|| resolver.resolve())
        .context("No usable NVIDIA API key")?;

    builder
        .credential(credential)
        .build()
        .context("Invalid configuration")
}

/// Key file (if given), then `NVIDIA_API_KEY`, then a hidden prompt unless
/// `--no-prompt`.
fn credential_resolver(cli: &Cli) -> CredentialResolver {
    let mut resolver = CredentialResolver::new();
    if let Some(ref path) = cli.api_key_file {
        resolver = resolver.with_source(FileSource::new(path));
    }
    resolver = resolver.with_source(EnvSource::default());
    if !cli.no_prompt {
        resolver = resolver.with_source(InteractiveSource::default());
    }
    resolver
}

async fn load_template(kind: TemplateKind, path: Option<&Path>) -> Result<Option<PromptTemplate>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = read_text(path, "template").await?;
    let template = PromptTemplate::custom(kind, text)
        .with_context(|| format!("Invalid template in {}", path.display()))?;
    Ok(Some(template))
}

async fn read_text(path: &Path, what: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {what} from {}", path.display()))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" | "" => PageSeparator::None,
        "newline" | "nl" => PageSeparator::Newline,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

fn spinner(enabled: bool, message: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Print (or save) a model reply, with optional score and usage summary.
async fn report(cli: &Cli, response: &ModelResponse, json: Option<Value>) -> Result<()> {
    let score = response.score();

    let json = if cli.json {
        let mut value = match json {
            Some(v) => v,
            None => serde_json::to_value(response).context("Failed to serialise output")?,
        };
        if cli.score {
            if let Value::Object(ref mut map) = value {
                map.insert(
                    "score".to_string(),
                    serde_json::to_value(score.map(|s| s.value))
                        .context("Failed to serialise score")?,
                );
            }
        }
        Some(value)
    } else {
        None
    };
    emit(cli, &response.content, json).await?;

    if cli.score && !cli.json {
        match score {
            Some(s) => eprintln!("{} {}", bold("Score:"), green(&format!("{}/10", s.value))),
            None => eprintln!("{} {}", bold("Score:"), yellow("not stated")),
        }
    }

    if response.was_truncated() && !cli.quiet {
        eprintln!(
            "{} reply stopped at the token limit; raise --max-tokens for the full text",
            yellow("⚠")
        );
    }
    if !cli.quiet {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms",
            dim(&response.prompt_tokens.to_string()),
            dim(&response.completion_tokens.to_string()),
            response.duration_ms,
        );
    }
    Ok(())
}

/// Write `text` (or `json` when given) to `--output` or stdout.
async fn emit(cli: &Cli, text: &str, json: Option<Value>) -> Result<()> {
    let body = match json {
        Some(v) => serde_json::to_string_pretty(&v).context("Failed to serialise output")?,
        None => text.to_string(),
    };

    if let Some(ref path) = cli.output {
        write_text(path, &body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
        return Ok(());
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(body.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !body.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}
