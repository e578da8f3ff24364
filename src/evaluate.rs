//! Evaluation entry points.
//!
//! Every operation here is strictly sequential: resolve the model client,
//! read the input, build one prompt, make one request. The client is resolved
//! first so a missing or malformed key fails before any file or network I/O.

use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::output::{Evaluation, ModelResponse};
use crate::pipeline::extract::{self, ExtractedDocument};
use crate::pipeline::llm;
use crate::prompts::{EvaluationPrompt, TemplateKind};
use crate::provider::{ChatModel, NvidiaProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Evaluate the essay in the PDF at `path` with the rubric `kind`.
///
/// `TemplateKind::Revision` is not an essay rubric and falls back to
/// `General`; use [`revise_evaluation`] for revisions.
///
/// # Errors
/// - [`EvalError::CredentialUnavailable`] when the config has no credential
///   and no provider (checked before the file is opened)
/// - file errors from extraction ([`EvalError::FileNotFound`], [`EvalError::NotAPdf`], …)
/// - remote errors from the single model call
///
/// Pages without text are not an error; they are listed in
/// [`Evaluation::empty_pages`].
pub async fn evaluate_essay(
    path: impl AsRef<Path>,
    kind: TemplateKind,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    let total_start = Instant::now();
    let path = path.as_ref();
    let prompt_kind = match kind {
        TemplateKind::Revision => TemplateKind::General,
        k => k,
    };
    info!("Evaluating {} with the {} rubric", path.display(), prompt_kind);

    // ── Step 1: Resolve the model client ─────────────────────────────────
    let provider = resolve_provider(config)?;

    // ── Step 2: Extract the essay ────────────────────────────────────────
    let document = extract::extract_text(path, &config.page_separator).await?;
    if document.text.is_empty() {
        warn!(
            "{} yielded no text; the model will be asked to grade an empty essay",
            path.display()
        );
    }

    // ── Step 3: Build the prompt ─────────────────────────────────────────
    let prompt = EvaluationPrompt::for_essay(prompt_kind, &document.text);
    let prompt_text = config.template(prompt_kind).render(&prompt)?;
    debug!("Prompt built: {} chars", prompt_text.len());

    // ── Step 4: Ask the model ────────────────────────────────────────────
    let response = llm::invoke(&provider, &prompt_text, config).await?;

    info!(
        "Evaluation complete in {}ms",
        total_start.elapsed().as_millis()
    );
    Ok(record(prompt_kind, Some(&document), prompt_text.len(), response))
}

/// Ask the model to revise a prior evaluation, read from a PDF, in light of
/// a human teacher's opinion.
pub async fn revise_evaluation(
    evaluation_pdf: impl AsRef<Path>,
    human_opinion: &str,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    let path = evaluation_pdf.as_ref();
    info!("Revising the evaluation in {}", path.display());

    let provider = resolve_provider(config)?;
    let document = extract::extract_text(path, &config.page_separator).await?;
    if document.text.is_empty() {
        warn!("{} yielded no text; the prior evaluation is empty", path.display());
    }

    revise_with(&provider, Some(&document), &document.text, human_opinion, config).await
}

/// Like [`revise_evaluation`], with the prior evaluation already in memory
/// (e.g. the text of an [`Evaluation`] from this process).
///
/// # Example
/// ```rust,no_run
/// use edgequake_essay_eval::{evaluate_essay, revise_evaluation_text, EvalConfig, TemplateKind};
///
/// # tokio_test::block_on(async {
/// let config = EvalConfig::default();
/// let first = evaluate_essay("essay.pdf", TemplateKind::General, &config).await?;
/// let revised = revise_evaluation_text(
///     first.text(),
///     "As a human teacher, I would rate the essay a 8 out of 10.",
///     &config,
/// )
/// .await?;
/// println!("{}", revised.text());
/// # Ok::<(), edgequake_essay_eval::EvalError>(())
/// # });
/// ```
pub async fn revise_evaluation_text(
    llm_evaluation: &str,
    human_opinion: &str,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    info!("Revising an in-memory evaluation");
    let provider = resolve_provider(config)?;
    revise_with(&provider, None, llm_evaluation, human_opinion, config).await
}

/// Send a free-form question as-is. Useful as a connectivity check; see
/// [`EvalConfig::smoke_test`] for the matching preset.
pub async fn ask(question: &str, config: &EvalConfig) -> Result<ModelResponse, EvalError> {
    let provider = resolve_provider(config)?;
    llm::invoke(&provider, question, config).await
}

/// Extract the text of a PDF without contacting the model.
///
/// Needs no credential.
pub async fn extract(
    path: impl AsRef<Path>,
    config: &EvalConfig,
) -> Result<ExtractedDocument, EvalError> {
    extract::extract_text(path, &config.page_separator).await
}

/// Evaluate a PDF and write the evaluation text to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn evaluate_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    kind: TemplateKind,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    let evaluation = evaluate_essay(path, kind, config).await?;
    write_text(output_path, evaluation.text()).await?;
    Ok(evaluation)
}

/// Write `text` to `path` atomically, creating parent directories.
pub async fn write_text(path: impl AsRef<Path>, text: &str) -> Result<(), EvalError> {
    let path = path.as_ref();
    let write_err = |e| EvalError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, text).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

// ── Sync wrappers ────────────────────────────────────────────────────────

fn runtime() -> Result<tokio::runtime::Runtime, EvalError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| EvalError::Internal(format!("Failed to create tokio runtime: {}", e)))
}

/// Synchronous wrapper around [`evaluate_essay`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn evaluate_essay_sync(
    path: impl AsRef<Path>,
    kind: TemplateKind,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    runtime()?.block_on(evaluate_essay(path, kind, config))
}

/// Synchronous wrapper around [`revise_evaluation`].
pub fn revise_evaluation_sync(
    evaluation_pdf: impl AsRef<Path>,
    human_opinion: &str,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    runtime()?.block_on(revise_evaluation(evaluation_pdf, human_opinion, config))
}

/// Synchronous wrapper around [`ask`].
pub fn ask_sync(question: &str, config: &EvalConfig) -> Result<ModelResponse, EvalError> {
    runtime()?.block_on(ask(question, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Pick the model client: a pre-built provider if the caller supplied one,
/// otherwise an NVIDIA client built from the config's credential.
fn resolve_provider(config: &EvalConfig) -> Result<Arc<dyn ChatModel>, EvalError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    let provider = NvidiaProvider::from_config(config)?;
    debug!("Using {} at {}", provider.model(), provider.endpoint());
    Ok(Arc::new(provider))
}

async fn revise_with(
    provider: &Arc<dyn ChatModel>,
    document: Option<&ExtractedDocument>,
    llm_evaluation: &str,
    human_opinion: &str,
    config: &EvalConfig,
) -> Result<Evaluation, EvalError> {
    let prompt = EvaluationPrompt::Revision {
        llm_evaluation,
        human_opinion,
    };
    let prompt_text = config.template(TemplateKind::Revision).render(&prompt)?;
    debug!("Revision prompt built: {} chars", prompt_text.len());

    let response = llm::invoke(provider, &prompt_text, config).await?;
    Ok(record(
        TemplateKind::Revision,
        document,
        prompt_text.len(),
        response,
    ))
}

fn record(
    kind: TemplateKind,
    document: Option<&ExtractedDocument>,
    prompt_chars: usize,
    response: ModelResponse,
) -> Evaluation {
    Evaluation {
        kind,
        source: document.and_then(|d| d.source.clone()),
        source_pages: document.map_or(0, |d| d.page_count()),
        empty_pages: document.map(|d| d.empty_pages()).unwrap_or_default(),
        prompt_chars,
        response,
    }
}
