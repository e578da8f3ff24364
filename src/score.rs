//! Best-effort score extraction from free-text evaluations.
//!
//! The rubrics ask for "an overall quality score on a scale of 1 to 10" but
//! models state it in prose, in whatever phrasing they like. The evaluation
//! text stays the primary result; this module is an optional convenience for
//! callers who want a number and can live with `None`.
//!
//! Recognised phrasings (case-insensitive):
//! - `8/10`, `7.5 / 10`
//! - `8 out of 10`
//! - `score: 8`, `Overall quality score: 8`, `rating - 6.5`, `rating is 7`
//! - `score on a scale of 1 to 10: 7`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SLASH_OR_OUT_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}(?:\.\d+)?)\s*(?:/|out\s+of)\s*10\b").expect("valid regex")
});

// The number must follow a separator (`:`, `=`, `-`, `is`), optionally after
// the rubric's own "on a scale of 1 to 10", so the scale bounds never match.
static LABELLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:score|rating|grade)\b(?:\s+on\s+a\s+scale\s+of\s+\d{1,2}\s*(?:to|-)\s*10)?\s*(?:[:=\-–]|\bis\b)\s*(\d{1,2}(?:\.\d+)?)\b",
    )
    .expect("valid regex")
});

/// A score on the 1–10 scale, as stated by the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f32,
}

/// Find the model's stated score.
///
/// When several scores appear (a revision often quotes the old one first),
/// the **last** match wins: it is the model's final word. Values outside
/// 0–10 are ignored.
pub fn extract_score(text: &str) -> Option<Score> {
    let last_of = |re: &Regex| {
        re.captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse::<f32>().ok())
            .filter(|v| (0.0..=10.0).contains(v))
            .last()
    };

    last_of(&SLASH_OR_OUT_OF)
        .or_else(|| last_of(&LABELLED))
        .map(|value| Score { value })
}
