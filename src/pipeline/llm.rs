//! Model invocation: send one prompt, return the complete response.
//!
//! Prompt text lives in [`crate::prompts`] and HTTP details in
//! [`crate::provider`].
//!
//! ## Retry Strategy
//!
//! None by default: `max_retries = 0` issues exactly one request and surfaces
//! any failure to the caller. When retries are opted into, only transient
//! errors ([`EvalError::is_retryable`]) are retried, with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) or the server's `Retry-After` on 429.

use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::output::ModelResponse;
use crate::provider::{ChatMessage, ChatModel, CompletionOptions};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Send `prompt` as a single user message and wait for the full reply.
pub async fn invoke(
    provider: &Arc<dyn ChatModel>,
    prompt: &str,
    config: &EvalConfig,
) -> Result<ModelResponse, EvalError> {
    let start = Instant::now();
    let messages = [ChatMessage::user(prompt)];
    let options = build_options(config);

    info!(
        "Requesting completion from {} ({}), prompt {} chars",
        provider.name(),
        provider.model(),
        prompt.len()
    );

    let mut attempt: u32 = 0;
    loop {
        match provider.chat(&messages, &options).await {
            Ok(response) => {
                let duration = start.elapsed();
                debug!(
                    "{} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens, response.completion_tokens, duration
                );
                return Ok(ModelResponse {
                    content: response.content,
                    model: response.model,
                    prompt_tokens: response.prompt_tokens,
                    completion_tokens: response.completion_tokens,
                    finish_reason: response.finish_reason,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt,
                });
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let backoff = backoff_for(&e, attempt, config.retry_backoff_ms);
                warn!(
                    "Attempt {} failed — {}; retry {}/{} after {}ms",
                    attempt,
                    e,
                    attempt,
                    config.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }
            Err(e) => {
                warn!("Completion failed after {} attempt(s): {}", attempt + 1, e);
                return Err(e);
            }
        }
    }
}

/// Build `CompletionOptions` from the evaluation config.
fn build_options(config: &EvalConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
    }
}

fn backoff_for(err: &EvalError, attempt: u32, base_ms: u64) -> Duration {
    if let EvalError::RateLimitExceeded {
        retry_after_secs: Some(secs),
        ..
    } = err
    {
        return Duration::from_secs((*secs).min(30));
    }
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}
