//! Remote model client.
//!
//! [`ChatModel`] is the seam between the evaluation pipeline and the network:
//! the pipeline only ever calls `chat()`, so tests swap in a fake and callers
//! can wrap the real client with their own middleware.
//!
//! [`NvidiaProvider`] speaks the OpenAI-compatible `chat/completions` dialect
//! served at `integrate.api.nvidia.com`. Any endpoint that accepts the same
//! request shape (a self-hosted NIM, a local proxy) works by changing
//! [`crate::config::EvalConfig::base_url`].
//!
//! All HTTP status interpretation lives in [`NvidiaProvider::map_status`].

use crate::config::EvalConfig;
use crate::credential::Credential;
use crate::error::EvalError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const USER_AGENT_VALUE: &str = concat!("edgequake-essay-eval/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body kept in [`EvalError::LlmApiError`].
const MAX_ERROR_BODY: usize = 500;

/// Speaker of a chat message. Prompts are always sent as the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// One message in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// The generated text plus whatever accounting the endpoint reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub finish_reason: Option<String>,
}

/// A text-generation backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider label for logs and error messages.
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Send `messages` and wait for the complete response.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, EvalError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

// ── NVIDIA endpoint ──────────────────────────────────────────────────────

/// Client for NVIDIA's hosted, OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct NvidiaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    credential: Credential,
    timeout_ms: Option<u64>,
}

impl NvidiaProvider {
    /// Build a client from `config`.
    ///
    /// Fails with [`EvalError::CredentialUnavailable`] when the config carries
    /// no credential, so no request is ever sent unauthenticated.
    pub fn from_config(config: &EvalConfig) -> Result<Self, EvalError> {
        let credential = config
            .credential
            .clone()
            .ok_or_else(|| EvalError::CredentialUnavailable {
                hint: "EvalConfig has neither a credential nor a provider.\n\
                       Resolve one with CredentialResolver and pass it to the builder."
                    .to_string(),
            })?;
        Self::new(&config.base_url, &config.model, credential, config.timeout_ms)
    }

    pub fn new(
        base_url: &str,
        model: &str,
        credential: Credential,
        timeout_ms: Option<u64>,
    ) -> Result<Self, EvalError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(default_headers);
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| EvalError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            credential,
            timeout_ms,
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Map a non-success status to an error. Only place status codes are read.
    async fn map_status(&self, response: reqwest::Response) -> EvalError {
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        match status {
            401 | 403 => EvalError::AuthError {
                provider: self.name().to_string(),
                detail: if message.is_empty() {
                    "invalid or expired API key".to_string()
                } else {
                    message
                },
            },
            429 => EvalError::RateLimitExceeded {
                provider: self.name().to_string(),
                retry_after_secs,
            },
            _ => EvalError::LlmApiError { status, message },
        }
    }

    fn map_transport(&self, e: reqwest::Error, started: Instant) -> EvalError {
        if e.is_timeout() {
            EvalError::ApiTimeout {
                elapsed_ms: self
                    .timeout_ms
                    .unwrap_or_else(|| started.elapsed().as_millis() as u64),
            }
        } else {
            EvalError::Network {
                endpoint: self.endpoint.clone(),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ChatModel for NvidiaProvider {
    fn name(&self) -> &str {
        "nvidia"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, EvalError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: false,
        };
        debug!(endpoint = %self.endpoint, model = %self.model, messages = messages.len(), "sending chat request");

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e, started))?;

        if !response.status().is_success() {
            return Err(self.map_status(response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport(e, started))?;
        parse_completion(&text, &self.model)
    }
}

/// Decode a successful chat-completions body.
fn parse_completion(body: &str, requested_model: &str) -> Result<LlmResponse, EvalError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| EvalError::InvalidResponse {
            detail: format!("malformed JSON: {e}"),
        })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| EvalError::InvalidResponse {
            detail: "response contained no choices".to_string(),
        })?;

    let usage = parsed.usage.unwrap_or_default();
    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        finish_reason: choice.finish_reason,
    })
}

/// Pull a human-readable message out of an error body.
///
/// Handles `{"error": {"message": …}}`, `{"error": "…"}`, `{"detail": "…"}`
/// and falls back to the (truncated) raw body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error"),
            value.get("detail"),
            value.get("message"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(s) = candidate.as_str() {
                return s.to_string();
            }
        }
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}\u{2026}", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
