//! Scheme-based dispatch of external references to pluggable backends.
//!
//! A reference is a URI of the form `scheme://rest#fragment`. The registry
//! splits on the first `://`, looks the scheme up and hands the whole URI to
//! the backend. Backends return raw bytes and must report a missing value
//! as [`ResolveError::NotFound`] rather than an empty payload: the tag
//! pipeline falls through to the next source on the former and stops on the
//! latter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::convert::BoxError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("'{uri}' not found")]
    NotFound { uri: String },

    #[error("no resolver registered for scheme '{scheme}'")]
    UnknownScheme { scheme: String },

    #[error("malformed reference '{uri}': {reason}")]
    Malformed { uri: String, reason: String },

    #[error("resolution cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to read '{uri}': {source}")]
    Io {
        uri: String,
        source: std::io::Error,
    },

    #[error("failed to resolve '{uri}': {source}")]
    Backend { uri: String, source: BoxError },
}

impl ResolveError {
    pub fn not_found(uri: &str) -> Self {
        ResolveError::NotFound {
            uri: uri.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }
}

/// Cooperative cancellation flag shared between a caller and a load.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call resolution context passed to every backend.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the caller cancelled or the deadline has passed.
    pub fn check(&self) -> Result<(), ResolveError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(ResolveError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ResolveError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// A backend that turns a URI into raw bytes.
///
/// Implementations are shared across concurrent loads and must be safe to
/// call from several threads at once.
pub trait Resolver: Send + Sync {
    fn resolve(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>, ResolveError>;
}

impl<F> Resolver for F
where
    F: Fn(&Context, &str) -> Result<Vec<u8>, ResolveError> + Send + Sync,
{
    fn resolve(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>, ResolveError> {
        self(ctx, uri)
    }
}

/// A reference split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri<'a> {
    pub scheme: &'a str,
    /// Everything between `://` and `#`.
    pub rest: &'a str,
    pub fragment: Option<&'a str>,
}

impl<'a> Uri<'a> {
    pub fn parse(uri: &'a str) -> Result<Self, ResolveError> {
        let (scheme, remainder) = uri.split_once("://").ok_or_else(|| ResolveError::Malformed {
            uri: uri.to_string(),
            reason: "missing '://'".into(),
        })?;

        let valid_scheme = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme {
            return Err(ResolveError::Malformed {
                uri: uri.to_string(),
                reason: format!("invalid scheme '{scheme}'"),
            });
        }

        let (rest, fragment) = match remainder.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (remainder, None),
        };

        Ok(Uri {
            scheme,
            rest,
            fragment,
        })
    }

    /// The part after the authority, including its leading `/`.
    pub fn path(&self) -> &'a str {
        match self.rest.find('/') {
            Some(i) => &self.rest[i..],
            None => "",
        }
    }

    pub fn authority(&self) -> &'a str {
        match self.rest.find('/') {
            Some(i) => &self.rest[..i],
            None => self.rest,
        }
    }
}

/// Give a reference a scheme: anything without `://` is a file path.
pub fn normalize_uri(uri: &str) -> String {
    let trimmed = uri.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("file://{trimmed}")
    }
}

/// Registry mapping URI schemes to backends.
#[derive(Clone, Default)]
pub struct Resolvers {
    backends: HashMap<String, Arc<dyn Resolver>>,
}

impl Resolvers {
    /// An empty registry. Every reference fails with `UnknownScheme`.
    pub fn new() -> Self {
        Self::default()
    }

    /// `file` and `env` backends (plus `http`/`https` with the `http`
    /// feature) reading the live process environment and filesystem.
    pub fn with_defaults() -> Self {
        let mut resolvers = Self::new();
        resolvers.register("file", crate::backend::FileResolver::new());
        resolvers.register("env", crate::backend::EnvResolver::process());
        #[cfg(feature = "http")]
        {
            let http = Arc::new(crate::backend::HttpResolver::new());
            resolvers.register_shared("http", http.clone());
            resolvers.register_shared("https", http);
        }
        resolvers
    }

    pub fn register(&mut self, scheme: &str, resolver: impl Resolver + 'static) -> &mut Self {
        self.register_shared(scheme, Arc::new(resolver))
    }

    pub fn register_shared(&mut self, scheme: &str, resolver: Arc<dyn Resolver>) -> &mut Self {
        self.backends.insert(scheme.to_ascii_lowercase(), resolver);
        self
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.backends.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Dispatch `uri` to the backend registered for its scheme.
    pub fn resolve(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>, ResolveError> {
        ctx.check()?;
        let parsed = Uri::parse(uri)?;
        let backend = self
            .backends
            .get(&parsed.scheme.to_ascii_lowercase())
            .ok_or_else(|| ResolveError::UnknownScheme {
                scheme: parsed.scheme.to_string(),
            })?;
        tracing::trace!(scheme = parsed.scheme, uri, "dispatching reference");
        backend.resolve(ctx, uri)
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_resolver(payload: &'static str) -> impl Resolver {
        move |_: &Context, _: &str| -> Result<Vec<u8>, ResolveError> {
            Ok(payload.as_bytes().to_vec())
        }
    }

    #[test]
    fn parse_splits_scheme_rest_and_fragment() {
        let uri = Uri::parse("vault://secret/data/db#password").unwrap();
        assert_eq!(uri.scheme, "vault");
        assert_eq!(uri.rest, "secret/data/db");
        assert_eq!(uri.fragment, Some("password"));
        assert_eq!(uri.authority(), "secret");
        assert_eq!(uri.path(), "/data/db");
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert!(matches!(
            Uri::parse("just/a/path"),
            Err(ResolveError::Malformed { .. })
        ));
        assert!(matches!(
            Uri::parse("1x://y"),
            Err(ResolveError::Malformed { .. })
        ));
    }

    #[test]
    fn normalize_defaults_to_file() {
        assert_eq!(normalize_uri("secrets/db.txt"), "file://secrets/db.txt");
        assert_eq!(normalize_uri(" /etc/pw "), "file:///etc/pw");
        assert_eq!(normalize_uri("env://HOME"), "env://HOME");
    }

    #[test]
    fn dispatches_by_scheme() {
        let mut resolvers = Resolvers::new();
        resolvers.register("mem", static_resolver("hello"));
        let ctx = Context::new();
        assert_eq!(resolvers.resolve(&ctx, "mem://anything").unwrap(), b"hello");
        assert_eq!(resolvers.resolve(&ctx, "MEM://anything").unwrap(), b"hello");
    }

    #[test]
    fn unknown_scheme_is_error() {
        let resolvers = Resolvers::new();
        let err = resolvers.resolve(&Context::new(), "vault://x").unwrap_err();
        assert!(matches!(err, ResolveError::UnknownScheme { scheme } if scheme == "vault"));
    }

    #[test]
    fn not_found_is_distinguishable() {
        let mut resolvers = Resolvers::new();
        resolvers.register(
            "none",
            |_: &Context, uri: &str| -> Result<Vec<u8>, ResolveError> {
                Err(ResolveError::not_found(uri))
            },
        );
        resolvers.register("empty", static_resolver(""));
        let ctx = Context::new();
        assert!(resolvers.resolve(&ctx, "none://x").unwrap_err().is_not_found());
        assert_eq!(resolvers.resolve(&ctx, "empty://x").unwrap(), b"");
    }

    #[test]
    fn cancelled_context_short_circuits() {
        let mut resolvers = Resolvers::new();
        resolvers.register("mem", static_resolver("x"));
        let token = CancelToken::new();
        let ctx = Context::new().with_cancel_token(token.clone());
        token.cancel();
        assert!(matches!(
            resolvers.resolve(&ctx, "mem://x"),
            Err(ResolveError::Cancelled)
        ));
    }

    #[test]
    fn expired_deadline_short_circuits() {
        let mut resolvers = Resolvers::new();
        resolvers.register("mem", static_resolver("x"));
        let ctx = Context::new().with_deadline(Instant::now());
        assert!(matches!(
            resolvers.resolve(&ctx, "mem://x"),
            Err(ResolveError::DeadlineExceeded)
        ));
    }

    #[test]
    fn schemes_are_listed_sorted() {
        let mut resolvers = Resolvers::new();
        resolvers.register("b", static_resolver(""));
        resolvers.register("a", static_resolver(""));
        assert_eq!(resolvers.schemes(), vec!["a", "b"]);
    }
}
