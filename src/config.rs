//! Configuration types for essay evaluation.
//!
//! All evaluation behaviour is controlled through [`EvalConfig`], built via
//! its [`EvalConfigBuilder`]. Keeping every knob in one struct makes it easy
//! to log a run's settings and diff two runs to understand why their outputs
//! differ.
//!
//! The credential travels inside the config rather than through the process
//! environment, so two configs with different keys can coexist in one process
//! and tests never have to touch global state.

use crate::credential::Credential;
use crate::error::EvalError;
use crate::prompts::{PromptTemplate, TemplateKind};
use crate::provider::ChatModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Model used by every evaluation unless overridden.
pub const DEFAULT_MODEL: &str = "meta/llama2-70b";

/// NVIDIA's OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

/// Configuration for an evaluation run.
///
/// Built via [`EvalConfig::builder()`] or using [`EvalConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_essay_eval::EvalConfig;
///
/// let config = EvalConfig::builder()
///     .model("meta/llama2-70b")
///     .max_tokens(1000)
///     .temperature(0.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EvalConfig {
    /// Remote model identifier. Default: `meta/llama2-70b`.
    pub model: String,

    /// API root; `/chat/completions` is appended. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Validated API key. Required unless `provider` is set.
    pub credential: Option<Credential>,

    /// Pre-constructed model client. Takes precedence over `credential`.
    pub provider: Option<Arc<dyn ChatModel>>,

    /// Sampling temperature. Default: `Some(0.0)`.
    ///
    /// Zero keeps grading near-deterministic: the same essay should get the
    /// same feedback on a rerun. `None` omits the field and lets the endpoint
    /// pick its own default.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate. Default: 1000.
    ///
    /// Enough for a multi-paragraph critique plus score. Too low truncates the
    /// evaluation mid-sentence, often before the score is stated.
    pub max_tokens: usize,

    /// Per-request timeout in milliseconds. Default: `None` (no timeout).
    pub timeout_ms: Option<u64>,

    /// Retry attempts on a transient failure. Default: 0.
    ///
    /// Off by default: a failed evaluation is surfaced immediately and the
    /// caller reruns. Permanent errors (bad key, 400) are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Inserted between pages of an extracted PDF. Default: [`PageSeparator::None`].
    pub page_separator: PageSeparator,

    /// Rubric overrides; kinds without an entry use the built-in text.
    pub templates: HashMap<TemplateKind, PromptTemplate>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            credential: None,
            provider: None,
            temperature: Some(0.0),
            max_tokens: 1000,
            timeout_ms: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            page_separator: PageSeparator::default(),
            templates: HashMap::new(),
        }
    }
}

impl fmt::Debug for EvalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn ChatModel>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("page_separator", &self.page_separator)
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EvalConfig {
    /// Create a new builder for `EvalConfig`.
    pub fn builder() -> EvalConfigBuilder {
        EvalConfigBuilder {
            config: Self::default(),
        }
    }

    /// Settings for a quick connectivity check: 500 tokens, endpoint-default
    /// temperature.
    pub fn smoke_test() -> Self {
        Self {
            max_tokens: 500,
            temperature: None,
            ..Self::default()
        }
    }

    /// The template to use for `kind`: an override if one was set, else built-in.
    pub fn template(&self, kind: TemplateKind) -> PromptTemplate {
        self.templates
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| PromptTemplate::builtin(kind))
    }
}

/// Builder for [`EvalConfig`].
#[derive(Debug)]
pub struct EvalConfigBuilder {
    config: EvalConfig,
}

impl EvalConfigBuilder {
    /// Start from an existing config, e.g. [`EvalConfig::smoke_test`].
    pub fn from_config(config: EvalConfig) -> Self {
        Self { config }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.config.credential = Some(credential);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ChatModel>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    /// Omit temperature from requests.
    pub fn provider_default_temperature(mut self) -> Self {
        self.config.temperature = None;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = Some(ms);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    /// Override the rubric for the template's kind.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.config.templates.insert(template.kind(), template);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EvalConfig, EvalError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(EvalError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(EvalError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(EvalError::InvalidConfig(format!(
                "base_url must be an HTTP/HTTPS URL, got '{}'",
                c.base_url
            )));
        }
        if c.timeout_ms == Some(0) {
            return Err(EvalError::InvalidConfig(
                "timeout_ms must be ≥ 1 (omit it for no timeout)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate pages when flattening a PDF to text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages are concatenated directly. (default)
    #[default]
    None,
    /// A single `\n` between pages.
    Newline,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    pub fn as_str(&self) -> &str {
        match self {
            PageSeparator::None => "",
            PageSeparator::Newline => "\n",
            PageSeparator::Custom(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_grading_setup() {
        let c = EvalConfig::default();
        assert_eq!(c.model, "meta/llama2-70b");
        assert_eq!(c.max_tokens, 1000);
        assert_eq!(c.temperature, Some(0.0));
        assert_eq!(c.timeout_ms, None);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.page_separator, PageSeparator::None);
    }

    #[test]
    fn smoke_test_preset() {
        let c = EvalConfig::smoke_test();
        assert_eq!(c.max_tokens, 500);
        assert_eq!(c.temperature, None);
        assert_eq!(c.model, DEFAULT_MODEL);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = EvalConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, Some(2.0));
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(EvalConfig::builder().max_tokens(0).build().is_err());
        assert!(EvalConfig::builder().model("  ").build().is_err());
        assert!(EvalConfig::builder().base_url("ftp://x").build().is_err());
        assert!(EvalConfig::builder().timeout_ms(0).build().is_err());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let c = EvalConfig::builder()
            .credential(Credential::parse("nvapi-topsecret").unwrap())
            .build()
            .unwrap();
        assert!(!format!("{c:?}").contains("topsecret"));
    }

    #[test]
    fn template_override_is_used() {
        let custom = PromptTemplate::custom(TemplateKind::Strict, "Be harsh: {essay}").unwrap();
        let c = EvalConfig::builder().template(custom.clone()).build().unwrap();
        assert_eq!(c.template(TemplateKind::Strict), custom);
        assert_eq!(
            c.template(TemplateKind::General),
            PromptTemplate::builtin(TemplateKind::General)
        );
    }

    #[test]
    fn separator_strings() {
        assert_eq!(PageSeparator::None.as_str(), "");
        assert_eq!(PageSeparator::Newline.as_str(), "\n");
        assert_eq!(PageSeparator::Custom("\x0c".into()).as_str(), "\x0c");
    }
}
