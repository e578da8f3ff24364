//! # edgequake-essay-eval
//!
//! Grade essays stored as PDFs with a hosted Large Language Model.
//!
//! ## Why this crate?
//!
//! Teachers receive essays as PDFs. Grading them with an LLM is three small
//! steps (pull the text out, wrap it in a rubric, ask the model) but each step
//! has a sharp edge: scanned pages that yield no text, keys pasted with the
//! wrong prefix, a rubric placeholder that silently stays unfilled. This crate
//! does those steps with precise errors and no hidden global state.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 0. Key      resolve + validate the NVIDIA key (env, file, prompt)
//!  ├─ 1. Input    check the path exists and starts with %PDF
//!  ├─ 2. Extract  per-page text via lopdf, concatenated in page order
//!  ├─ 3. Prompt   fill the General / Strict / Revision rubric
//!  └─ 4. Model    one chat-completions request, full reply as text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_essay_eval::{evaluate_essay, CredentialResolver, EvalConfig, TemplateKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // NVIDIA_API_KEY, or an interactive prompt when it is unset
//!     let credential = CredentialResolver::default().resolve()?;
//!     let config = EvalConfig::builder().credential(credential).build()?;
//!
//!     let evaluation = evaluate_essay("essay.pdf", TemplateKind::Strict, &config).await?;
//!     println!("{}", evaluation.text());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `essay-eval` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-essay-eval = { version = "0.1", default-features = false }
//! ```
//!
//! ## Determinism
//!
//! Evaluations default to temperature `0.0` and 1000 output tokens, so
//! rerunning the same essay gives (near) identical feedback. Nothing is
//! retried unless [`EvalConfigBuilder::max_retries`] is set.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credential;
pub mod error;
pub mod evaluate;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod score;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EvalConfig, EvalConfigBuilder, PageSeparator};
pub use credential::{
    Credential, CredentialResolver, CredentialSource, EnvSource, FileSource, InteractiveSource,
    StaticSource,
};
pub use error::EvalError;
pub use evaluate::{
    ask, ask_sync, evaluate_essay, evaluate_essay_sync, evaluate_to_file, extract,
    revise_evaluation, revise_evaluation_sync, revise_evaluation_text, write_text,
};
pub use output::{Evaluation, ModelResponse};
pub use pipeline::extract::{extract_text_from_bytes, ExtractedDocument, PageStatus, PageText};
pub use prompts::{EvaluationPrompt, PromptTemplate, TemplateKind};
pub use provider::{ChatMessage, ChatModel, CompletionOptions, LlmResponse, NvidiaProvider};
pub use score::{extract_score, Score};
