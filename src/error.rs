//! Error types for the edgequake-essay-eval library.
//!
//! Every failure here is **fatal** to the current run. An evaluation is a
//! single-shot round trip (extract → prompt → one model call), so there is no
//! partial result worth keeping: the caller fixes the cause and reruns.
//!
//! A PDF page that yields no text is not an error at all. It is recorded on
//! [`crate::pipeline::extract::ExtractedDocument`] and logged at `warn` level
//! instead.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-essay-eval library.
#[derive(Debug, Error)]
pub enum EvalError {
    // ── Credential errors ─────────────────────────────────────────────────
    /// The supplied API key does not carry the expected prefix.
    ///
    /// Only the first five characters are kept so the key never ends up in
    /// logs or terminal scrollback.
    #[error("{preview}... is not a valid key\nNVIDIA API keys start with '{expected_prefix}'.")]
    InvalidCredential {
        preview: String,
        expected_prefix: &'static str,
    },

    /// No credential source produced a value (non-interactive run, empty file…).
    #[error("No API key available.\n{hint}")]
    CredentialUnavailable { hint: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF is encrypted; text cannot be extracted.
    #[error("PDF '{path}' is encrypted.\nDecrypt it first, e.g. qpdf --decrypt input.pdf output.pdf")]
    EncryptedPdf { path: PathBuf },

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// A custom rubric template is missing a placeholder its kind requires.
    #[error("Template for '{kind}' is missing the {{{placeholder}}} placeholder")]
    InvalidTemplate { kind: String, placeholder: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The request never produced an HTTP response (DNS, TLS, connection reset…).
    #[error("Network error talking to '{endpoint}': {detail}")]
    Network { endpoint: String, detail: String },

    /// The request exceeded the configured timeout.
    #[error("API call timed out after {elapsed_ms}ms\nIncrease --timeout-ms or leave it unset.")]
    ApiTimeout { elapsed_ms: u64 },

    /// The endpoint rejected the credential (401/403). Never retried.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// Endpoint returned HTTP 429.
    ///
    /// Check `retry_after_secs` for a server-specified delay.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success status: invalid request, context-length overflow,
    /// model overloaded, unknown model…
    #[error("LLM API error (HTTP {status}): {message}")]
    LlmApiError { status: u16, message: String },

    /// A 2xx response whose body could not be understood.
    #[error("Invalid response from provider: {detail}")]
    InvalidResponse { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Whether an opt-in retry could plausibly succeed.
    ///
    /// Transport failures, timeouts, 429 and 5xx are transient. Credential,
    /// input, and 4xx request errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            EvalError::Network { .. }
            | EvalError::ApiTimeout { .. }
            | EvalError::RateLimitExceeded { .. } => true,
            EvalError::LlmApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
