//! Evaluation prompt templates and the prompt builder.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing a rubric requires editing exactly
//!    one place.
//!
//! 2. **Testability** — unit tests can render and inspect prompts directly
//!    without a model, so rubric regressions are easy to catch.
//!
//! The three rubrics share one renderer, selected by [`TemplateKind`]. Callers
//! can replace a rubric via [`PromptTemplate::custom`] (exposed as
//! `--template` on the CLI); the constants here are used otherwise.

use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// General-purpose essay evaluation.
pub const GENERAL_TEMPLATE: &str = r#"Please evaluate the quality of the following essay:

{essay}

Provide a detailed analysis of the strengths and weaknesses of the essay, and give an overall quality score on a scale of 1 to 10."#;

/// Evaluation from the point of view of a strict, technically minded teacher.
pub const STRICT_TEMPLATE: &str = r#"As a strict technical background teacher, I will provide a thorough evaluation of the following essay:

{essay}

The essay will be assessed on the following criteria:
- Clarity and conciseness of the writing
- Logical flow and organization of the content
- Appropriate use of technical terms and concepts
- Depth of understanding and analysis of the subject matter
- Overall effectiveness in conveying the key points

Please note that I will be evaluating this essay with a critical eye and a focus on technical excellence, and give an overall quality score on a scale of 1 to 10."#;

/// Ask the model to revise a prior evaluation in light of a human opinion.
pub const REVISION_TEMPLATE: &str = r#"The language model has provided the following evaluation:

{llm_evaluation}

As a human teacher has given opinion on the essay:

{human_opinion}

The human teacher would like you to revise your evaluation. Please add human teacher's opinion and summary the evaluation in 200 words. Revise and give an overall quality score on a scale of 1 to 10."#;

/// Which rubric to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Strengths/weaknesses analysis with a 1–10 score. (default)
    #[default]
    General,
    /// Five technical criteria, assessed with a critical eye.
    Strict,
    /// Merge a human opinion into a prior evaluation.
    Revision,
}

impl TemplateKind {
    /// The built-in template text.
    pub fn default_text(self) -> &'static str {
        match self {
            TemplateKind::General => GENERAL_TEMPLATE,
            TemplateKind::Strict => STRICT_TEMPLATE,
            TemplateKind::Revision => REVISION_TEMPLATE,
        }
    }

    /// Placeholder names this kind substitutes, in template order.
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            TemplateKind::General | TemplateKind::Strict => &["essay"],
            TemplateKind::Revision => &["llm_evaluation", "human_opinion"],
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateKind::General => "general",
            TemplateKind::Strict => "strict",
            TemplateKind::Revision => "revision",
        })
    }
}

/// A template's text together with the kind it renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    kind: TemplateKind,
    text: Cow<'static, str>,
}

impl PromptTemplate {
    /// The built-in template for `kind`.
    pub fn builtin(kind: TemplateKind) -> Self {
        Self {
            kind,
            text: Cow::Borrowed(kind.default_text()),
        }
    }

    /// A caller-supplied rubric.
    ///
    /// Every placeholder `kind` needs must appear at least once, otherwise the
    /// essay (or opinion) would be silently dropped from the prompt.
    pub fn custom(kind: TemplateKind, text: impl Into<String>) -> Result<Self, EvalError> {
        let text = text.into();
        for name in kind.placeholders() {
            if !text.contains(&format!("{{{name}}}")) {
                return Err(EvalError::InvalidTemplate {
                    kind: kind.to_string(),
                    placeholder: (*name).to_string(),
                });
            }
        }
        Ok(Self {
            kind,
            text: Cow::Owned(text),
        })
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render with the values carried by `prompt`.
    ///
    /// Fails only when `prompt` is for a different kind than this template.
    pub fn render(&self, prompt: &EvaluationPrompt<'_>) -> Result<String, EvalError> {
        if prompt.kind() != self.kind {
            return Err(EvalError::InvalidConfig(format!(
                "template is for '{}' but the prompt is '{}'",
                self.kind,
                prompt.kind()
            )));
        }
        Ok(substitute(&self.text, &prompt.values()))
    }
}

/// The values for one prompt, tagged by rubric.
///
/// Each variant carries exactly the fields its template needs, so a missing
/// substitution cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPrompt<'a> {
    General { essay: &'a str },
    Strict { essay: &'a str },
    Revision {
        llm_evaluation: &'a str,
        human_opinion: &'a str,
    },
}

impl<'a> EvaluationPrompt<'a> {
    /// An essay prompt for `kind`.
    ///
    /// An essay alone cannot fill the revision template, so `Revision` maps to
    /// `General` here. Build [`EvaluationPrompt::Revision`] directly instead.
    pub fn for_essay(kind: TemplateKind, essay: &'a str) -> Self {
        match kind {
            TemplateKind::Strict => EvaluationPrompt::Strict { essay },
            TemplateKind::General | TemplateKind::Revision => EvaluationPrompt::General { essay },
        }
    }

    pub fn kind(&self) -> TemplateKind {
        match self {
            EvaluationPrompt::General { .. } => TemplateKind::General,
            EvaluationPrompt::Strict { .. } => TemplateKind::Strict,
            EvaluationPrompt::Revision { .. } => TemplateKind::Revision,
        }
    }

    fn values(&self) -> Vec<(&'static str, &'a str)> {
        match *self {
            EvaluationPrompt::General { essay } | EvaluationPrompt::Strict { essay } => {
                vec![("essay", essay)]
            }
            EvaluationPrompt::Revision {
                llm_evaluation,
                human_opinion,
            } => vec![
                ("llm_evaluation", llm_evaluation),
                ("human_opinion", human_opinion),
            ],
        }
    }

    /// Render with the built-in template for this prompt's kind.
    pub fn render(&self) -> String {
        substitute(self.kind().default_text(), &self.values())
    }
}

/// Single-pass `{name}` substitution.
///
/// Substituted text is copied verbatim and never re-scanned, so an essay that
/// happens to contain `{human_opinion}` stays as written. Braces that do not
/// form a known placeholder are left untouched.
fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
