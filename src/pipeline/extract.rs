//! PDF text extraction: flatten every page's text into one string via lopdf.
//!
//! ## Why spawn_blocking?
//!
//! Parsing and decoding content streams is CPU-bound and synchronous. Running
//! it through `tokio::task::spawn_blocking` keeps the runtime's worker threads
//! free, the same way any other blocking parser would be driven.
//!
//! ## Pages without text
//!
//! A scanned (image-only) page, or one whose content stream cannot be decoded,
//! contributes an empty string instead of failing the document. Those pages
//! are listed by [`ExtractedDocument::empty_pages`] and logged at `warn` so the
//! loss is visible without aborting the run.

use crate::config::PageSeparator;
use crate::error::EvalError;
use crate::pipeline::input;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What extraction produced for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PageStatus {
    /// Text was found.
    Extracted,
    /// The page decoded fine but holds no text (e.g. a scanned image).
    Empty,
    /// Decoding failed; the page contributes nothing.
    Failed(String),
}

/// Text of one page, 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page_num: usize,
    pub text: String,
    pub status: PageStatus,
}

impl PageText {
    /// Text as extracted. A whitespace-only page keeps its text but is
    /// marked [`PageStatus::Empty`].
    pub fn extracted(page_num: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let status = if text.trim().is_empty() {
            PageStatus::Empty
        } else {
            PageStatus::Extracted
        };
        Self {
            page_num,
            text,
            status,
        }
    }

    pub fn empty(page_num: usize) -> Self {
        Self {
            page_num,
            text: String::new(),
            status: PageStatus::Empty,
        }
    }

    pub fn failed(page_num: usize, detail: impl Into<String>) -> Self {
        Self {
            page_num,
            text: String::new(),
            status: PageStatus::Failed(detail.into()),
        }
    }
}

/// A flattened document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Where the PDF came from; `None` for in-memory input.
    pub source: Option<PathBuf>,
    /// Per-page results in page order.
    pub pages: Vec<PageText>,
    /// All page texts joined with the configured separator.
    pub text: String,
}

impl ExtractedDocument {
    /// Assemble from per-page results (sorted into page order first).
    pub fn from_pages(
        source: Option<PathBuf>,
        mut pages: Vec<PageText>,
        separator: &PageSeparator,
    ) -> Self {
        pages.sort_by_key(|p| p.page_num);
        let text = join_pages(&pages, separator);
        Self {
            source,
            pages,
            text,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-indexed numbers of pages that contributed no text.
    pub fn empty_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.status != PageStatus::Extracted)
            .map(|p| p.page_num)
            .collect()
    }
}

/// Join page texts in the given order. No trimming or normalisation.
pub fn join_pages(pages: &[PageText], separator: &PageSeparator) -> String {
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(separator.as_str())
}

/// Extract the text of the PDF at `path`.
///
/// # Errors
/// - [`EvalError::FileNotFound`] / [`EvalError::PermissionDenied`] / [`EvalError::NotAPdf`]
/// - [`EvalError::CorruptPdf`] when the file cannot be parsed
/// - [`EvalError::EncryptedPdf`] when it cannot be decrypted
///
/// Pages without text never cause an error.
pub async fn extract_text(
    path: impl AsRef<Path>,
    separator: &PageSeparator,
) -> Result<ExtractedDocument, EvalError> {
    let path = path.as_ref().to_path_buf();
    let separator = separator.clone();

    tokio::task::spawn_blocking(move || extract_text_blocking(&path, &separator))
        .await
        .map_err(|e| EvalError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Blocking implementation of [`extract_text`].
pub fn extract_text_blocking(
    path: &Path,
    separator: &PageSeparator,
) -> Result<ExtractedDocument, EvalError> {
    let path = input::resolve_input(path)?;
    let document = Document::load(&path).map_err(|e| load_error(&path, e))?;
    let pages = extract_pages(&document);
    let doc = ExtractedDocument::from_pages(Some(path), pages, separator);
    log_summary(&doc);
    Ok(doc)
}

/// Extract text from PDF bytes already in memory.
pub fn extract_text_from_bytes(
    bytes: &[u8],
    separator: &PageSeparator,
) -> Result<ExtractedDocument, EvalError> {
    let pseudo_path = PathBuf::from("<memory>");
    if bytes.len() >= 4 && !input::is_pdf_magic(bytes) {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(EvalError::NotAPdf {
            path: pseudo_path,
            magic,
        });
    }
    let document = Document::load_mem(bytes).map_err(|e| load_error(&pseudo_path, e))?;
    let pages = extract_pages(&document);
    let doc = ExtractedDocument::from_pages(None, pages, separator);
    log_summary(&doc);
    Ok(doc)
}

/// Walk every page in order, never failing on a single page.
fn extract_pages(document: &Document) -> Vec<PageText> {
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    info!("PDF loaded: {} pages", page_numbers.len());

    page_numbers
        .into_iter()
        .map(|n| {
            let page_num = n as usize;
            match document.extract_text(&[n]) {
                Ok(mut text) => {
                    strip_page_break(&mut text);
                    let page = PageText::extracted(page_num, text);
                    debug!("Page {}: {} chars", page_num, page.text.len());
                    page
                }
                Err(e) => {
                    warn!("Page {}: text extraction failed — {}", page_num, e);
                    PageText::failed(page_num, e.to_string())
                }
            }
        })
        .collect()
}

/// lopdf ends every text object with `\n`; drop the one closing the page so
/// pages join without an implicit separator.
fn strip_page_break(text: &mut String) {
    if text.ends_with('\n') {
        text.pop();
    }
}

fn load_error(path: &Path, e: lopdf::Error) -> EvalError {
    let detail = e.to_string();
    let lower = detail.to_lowercase();
    if lower.contains("decrypt") || lower.contains("encrypt") || lower.contains("password") {
        EvalError::EncryptedPdf {
            path: path.to_path_buf(),
        }
    } else {
        EvalError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

fn log_summary(doc: &ExtractedDocument) {
    let empty = doc.empty_pages();
    if !empty.is_empty() {
        warn!(
            "{} of {} pages yielded no text (pages {:?}); scanned pages need OCR",
            empty.len(),
            doc.page_count(),
            empty
        );
    }
    info!(
        "Extracted {} chars from {} pages",
        doc.text.len(),
        doc.page_count()
    );
}
