//! Result types returned by the evaluation entry points.

use crate::prompts::TemplateKind;
use crate::score::{extract_score, Score};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The model's reply. `content` is opaque free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text exactly as returned.
    pub content: String,
    /// Model that answered (as reported by the endpoint).
    pub model: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// `"stop"`, `"length"`, … when reported. `"length"` means the text was
    /// cut at `max_tokens`.
    pub finish_reason: Option<String>,
    pub duration_ms: u64,
    /// Retries spent before success (always 0 unless retries were enabled).
    pub retries: u32,
}

impl ModelResponse {
    /// Best-effort score parse; see [`crate::score`].
    pub fn score(&self) -> Option<Score> {
        extract_score(&self.content)
    }

    /// Whether generation stopped at the token limit.
    pub fn was_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// One evaluation round trip: what was sent and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub kind: TemplateKind,
    /// PDF the essay (or prior evaluation) was read from, if any.
    pub source: Option<PathBuf>,
    /// Pages in the source PDF.
    pub source_pages: usize,
    /// Pages that contributed no text.
    pub empty_pages: Vec<usize>,
    /// Length of the final prompt in bytes.
    pub prompt_chars: usize,
    pub response: ModelResponse,
}

impl Evaluation {
    /// The evaluation text.
    pub fn text(&self) -> &str {
        &self.response.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_flag() {
        let mut r = ModelResponse {
            finish_reason: Some("length".into()),
            ..Default::default()
        };
        assert!(r.was_truncated());
        r.finish_reason = Some("stop".into());
        assert!(!r.was_truncated());
    }

    #[test]
    fn score_delegates_to_parser() {
        let r = ModelResponse {
            content: "Solid work overall, 7 out of 10.".into(),
            ..Default::default()
        };
        assert_eq!(r.score().map(|s| s.value), Some(7.0));
    }

    #[test]
    fn evaluation_serialises_kind_lowercase() {
        let e = Evaluation {
            kind: TemplateKind::Strict,
            source: None,
            source_pages: 0,
            empty_pages: vec![],
            prompt_chars: 10,
            response: ModelResponse::default(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "strict");
    }
}
