//! Pipeline stages for essay evaluation.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the model backend can be swapped without touching extraction.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (prompts) ──▶ llm
//! (path)    (lopdf)     (template)    (one request)
//! ```
//!
//! 1. [`input`]   — validate the path: exists, readable, `%PDF` magic
//! 2. [`extract`] — per-page text, concatenated in page order; runs in
//!    `spawn_blocking` because parsing is synchronous
//! 3. [`llm`]     — the single model call; the only stage with network I/O

pub mod extract;
pub mod input;
pub mod llm;
