//! API credential resolution.
//!
//! A [`Credential`] can only be built through [`Credential::parse`], which
//! enforces the `nvapi-` prefix. Since the provider takes a `Credential`
//! rather than a raw string, an invalid key is rejected before any request
//! can be constructed.
//!
//! Where the key comes from is pluggable: [`CredentialResolver`] walks an
//! ordered list of [`CredentialSource`]s. The default chain uses
//! `NVIDIA_API_KEY` if it holds a well-formed key, otherwise asks for one with
//! echo disabled.
//!
//! The resolved value is returned to the caller and passed explicitly through
//! [`crate::config::EvalConfig`]; the process environment is never modified.

use crate::error::EvalError;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Prefix every NVIDIA API key carries.
pub const NVIDIA_KEY_PREFIX: &str = "nvapi-";

/// Environment variable checked by [`EnvSource::default`].
pub const NVIDIA_API_KEY_ENV: &str = "NVIDIA_API_KEY";

/// A validated API key.
///
/// `Debug` is redacted so a config can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Validate `value` against [`NVIDIA_KEY_PREFIX`]. The value is kept unchanged.
    pub fn parse(value: impl Into<String>) -> Result<Self, EvalError> {
        let value = value.into();
        if value.starts_with(NVIDIA_KEY_PREFIX) {
            Ok(Self(value))
        } else {
            Err(EvalError::InvalidCredential {
                preview: value.chars().take(5).collect(),
                expected_prefix: NVIDIA_KEY_PREFIX,
            })
        }
    }

    /// The raw key, for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({NVIDIA_KEY_PREFIX}***)")
    }
}

/// Where a raw (not yet validated) key can come from.
pub trait CredentialSource: Send + Sync {
    /// Short label for logs, e.g. `"env:NVIDIA_API_KEY"`.
    fn name(&self) -> String;

    /// Fetch a raw value. `Ok(None)` means "nothing here, try the next source".
    fn fetch(&self) -> Result<Option<String>, EvalError>;

    /// Whether a badly prefixed value from this source is fatal.
    ///
    /// Passive sources (environment) return `false` so the resolver can fall
    /// through to the next source; sources where the user typed or pointed at
    /// a value return `true`.
    fn authoritative(&self) -> bool {
        true
    }
}

/// Reads an environment variable.
pub struct EnvSource {
    var: String,
}

impl EnvSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new(NVIDIA_API_KEY_ENV)
    }
}

impl CredentialSource for EnvSource {
    fn name(&self) -> String {
        format!("env:{}", self.var)
    }

    fn fetch(&self) -> Result<Option<String>, EvalError> {
        Ok(std::env::var(&self.var).ok().filter(|v| !v.is_empty()))
    }

    fn authoritative(&self) -> bool {
        false
    }
}

/// Prompts on the terminal with input echo suppressed.
pub struct InteractiveSource {
    prompt: String,
}

impl Default for InteractiveSource {
    fn default() -> Self {
        Self {
            prompt: format!("NVAPI Key (starts with {NVIDIA_KEY_PREFIX})"),
        }
    }
}

impl CredentialSource for InteractiveSource {
    fn name(&self) -> String {
        "interactive".to_string()
    }

    fn fetch(&self) -> Result<Option<String>, EvalError> {
        dialoguer::Password::new()
            .with_prompt(&self.prompt)
            .allow_empty_password(true)
            .interact()
            .map(Some)
            .map_err(|e| EvalError::CredentialUnavailable {
                hint: format!(
                    "Could not read a key from the terminal: {e}\n\
                     Set {NVIDIA_API_KEY_ENV} or pass --api-key-file."
                ),
            })
    }
}

/// Reads the first line of a file (e.g. a mounted secret).
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileSource {
    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn fetch(&self) -> Result<Option<String>, EvalError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            EvalError::CredentialUnavailable {
                hint: format!("Failed to read key file {:?}: {e}", self.path),
            }
        })?;
        Ok(content
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()))
    }
}

/// A fixed value; handy for tests and for callers with their own secret store.
pub struct StaticSource(pub String);

impl CredentialSource for StaticSource {
    fn name(&self) -> String {
        "static".to_string()
    }

    fn fetch(&self) -> Result<Option<String>, EvalError> {
        Ok(Some(self.0.clone()))
    }
}

/// Tries each source in order and validates the first value found.
pub struct CredentialResolver {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl Default for CredentialResolver {
    /// `NVIDIA_API_KEY`, then an interactive hidden prompt.
    fn default() -> Self {
        Self::new()
            .with_source(EnvSource::default())
            .with_source(InteractiveSource::default())
    }
}

impl CredentialResolver {
    /// An empty resolver; add sources with [`with_source`](Self::with_source).
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Resolve a credential.
    ///
    /// A malformed value from a non-authoritative source is skipped; a
    /// malformed value from an authoritative source aborts immediately with
    /// [`EvalError::InvalidCredential`]. There is no second attempt.
    pub fn resolve(&self) -> Result<Credential, EvalError> {
        for source in &self.sources {
            let Some(raw) = source.fetch()? else {
                debug!(source = %source.name(), "no credential from source");
                continue;
            };

            match Credential::parse(raw) {
                Ok(credential) => {
                    info!(source = %source.name(), "using valid API key");
                    return Ok(credential);
                }
                Err(e) if source.authoritative() => return Err(e),
                Err(e) => {
                    warn!(source = %source.name(), "ignoring malformed key: {e}");
                }
            }
        }

        Err(EvalError::CredentialUnavailable {
            hint: format!("Set {NVIDIA_API_KEY_ENV}=nvapi-... or pass --api-key-file."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        value: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl CredentialSource for CountingSource {
        fn name(&self) -> String {
            "counting".into()
        }

        fn fetch(&self) -> Result<Option<String>, EvalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    struct PassiveSource(&'static str);

    impl CredentialSource for PassiveSource {
        fn name(&self) -> String {
            "passive".into()
        }

        fn fetch(&self) -> Result<Option<String>, EvalError> {
            Ok(Some(self.0.to_string()))
        }

        fn authoritative(&self) -> bool {
            false
        }
    }

    #[test]
    fn valid_key_is_returned_unchanged() {
        let c = Credential::parse("nvapi-abc123").unwrap();
        assert_eq!(c.expose(), "nvapi-abc123");
    }

    #[test]
    fn invalid_key_is_rejected_with_preview() {
        match Credential::parse("sk-abcdef123456") {
            Err(EvalError::InvalidCredential { preview, .. }) => assert_eq!(preview, "sk-ab"),
            other => panic!("expected InvalidCredential, got {other:?}"),
        }
    }

    #[test]
    fn short_invalid_key_preview_does_not_panic() {
        match Credential::parse("ab") {
            Err(EvalError::InvalidCredential { preview, .. }) => assert_eq!(preview, "ab"),
            other => panic!("expected InvalidCredential, got {other:?}"),
        }
    }

    #[test]
    fn debug_is_redacted() {
        let c = Credential::parse("nvapi-supersecret").unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("supersecret"), "got: {dbg}");
    }

    #[test]
    fn malformed_passive_value_falls_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CredentialResolver::new()
            .with_source(PassiveSource("not-a-key"))
            .with_source(CountingSource {
                value: Some("nvapi-typed".into()),
                calls: Arc::clone(&calls),
            });

        let c = resolver.resolve().unwrap();
        assert_eq!(c.expose(), "nvapi-typed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn valid_passive_value_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CredentialResolver::new()
            .with_source(PassiveSource("nvapi-from-env"))
            .with_source(CountingSource {
                value: Some("nvapi-typed".into()),
                calls: Arc::clone(&calls),
            });

        assert_eq!(resolver.resolve().unwrap().expose(), "nvapi-from-env");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "prompt must not run");
    }

    #[test]
    fn malformed_authoritative_value_is_fatal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CredentialResolver::new()
            .with_source(StaticSource("wrong-key".into()))
            .with_source(CountingSource {
                value: Some("nvapi-never-reached".into()),
                calls: Arc::clone(&calls),
            });

        assert!(matches!(
            resolver.resolve(),
            Err(EvalError::InvalidCredential { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no second attempt");
    }

    #[test]
    fn empty_chain_is_unavailable() {
        let resolver = CredentialResolver::new();
        assert!(matches!(
            resolver.resolve(),
            Err(EvalError::CredentialUnavailable { .. })
        ));
    }

    #[test]
    fn file_source_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "nvapi-from-file\nignored\n").unwrap();

        let c = CredentialResolver::new()
            .with_source(FileSource::new(&path))
            .resolve()
            .unwrap();
        assert_eq!(c.expose(), "nvapi-from-file");
    }

    #[test]
    fn missing_file_source_is_an_error() {
        let resolver = CredentialResolver::new().with_source(FileSource::new("/no/such/key/file"));
        assert!(matches!(
            resolver.resolve(),
            Err(EvalError::CredentialUnavailable { .. })
        ));
    }
}
