//! Input resolution: validate a user-supplied PDF path before parsing.
//!
//! We check existence, read permission and the PDF magic bytes (`%PDF`) up
//! front so callers get a precise error ("not found", "permission denied",
//! "not a PDF") rather than an opaque parser failure.

use crate::error::EvalError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable PDF and return it as a `PathBuf`.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<PathBuf, EvalError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(EvalError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && !is_pdf_magic(&magic) {
                return Err(EvalError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(EvalError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(EvalError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Check the first four bytes of a buffer for the `%PDF` signature.
pub fn is_pdf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}
