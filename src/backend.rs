//! Built-in resolver backends: `file://`, `env://` and, with the `http`
//! feature, `http://` / `https://`.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::resolver::{Context, ResolveError, Resolver, Uri};

/// Reads `file://path` references from the filesystem.
///
/// Relative paths are joined onto the base directory given at construction
/// (the process working directory when none is set). `file:///abs` is an
/// absolute path.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    base_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    fn path_for(&self, rest: &str) -> PathBuf {
        let path = Path::new(rest);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Resolver for FileResolver {
    fn resolve(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>, ResolveError> {
        ctx.check()?;
        let parsed = Uri::parse(uri)?;
        if parsed.rest.is_empty() {
            return Err(ResolveError::Malformed {
                uri: uri.to_string(),
                reason: "empty file path".into(),
            });
        }
        let path = self.path_for(parsed.rest);
        match std::fs::read(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ResolveError::not_found(uri)),
            Err(e) => Err(ResolveError::Io {
                uri: uri.to_string(),
                source: e,
            }),
        }
    }
}

/// Reads `env://NAME` references from an environment.
///
/// A set-but-empty variable resolves to an empty payload; an unset one is
/// not found. Values are returned as their raw bytes, so non-UTF-8 content
/// survives.
#[derive(Debug, Clone)]
pub struct EnvResolver {
    vars: Option<HashMap<String, Vec<u8>>>,
}

impl EnvResolver {
    /// Look variables up in the live process environment at call time.
    pub fn process() -> Self {
        Self { vars: None }
    }

    /// Look variables up in a fixed set of pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Resolver for EnvResolver {
    fn resolve(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>, ResolveError> {
        ctx.check()?;
        let name = Uri::parse(uri)?.rest;
        let value = match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var_os(name).map(OsString::into_encoded_bytes),
        };
        value.ok_or_else(|| ResolveError::not_found(uri))
    }
}

/// Fetches `http(s)://` references with a blocking client.
///
/// A 404 response is not found; other non-success statuses are errors. The
/// request timeout is bounded by the context deadline.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpResolver {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl Resolver for HttpResolver {
    fn resolve(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>, ResolveError> {
        ctx.check()?;
        let backend = |source: reqwest::Error| ResolveError::Backend {
            uri: uri.to_string(),
            source: Box::new(source),
        };

        let mut request = self.client.get(uri);
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining);
        }
        let response = request.send().map_err(backend)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::not_found(uri));
        }
        let response = response.error_for_status().map_err(backend)?;
        let body = response.bytes().map_err(backend)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn file_relative_to_base_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("token"), b"s3cret\n").unwrap();
        let resolver = FileResolver::with_base_dir(dir.path());
        let bytes = resolver.resolve(&Context::new(), "file://token").unwrap();
        assert_eq!(bytes, b"s3cret\n");
    }

    #[test]
    fn file_absolute_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abs");
        fs::write(&path, b"x").unwrap();
        let uri = format!("file://{}", path.display());
        let bytes = FileResolver::new().resolve(&Context::new(), &uri).unwrap();
        assert_eq!(bytes, b"x");
    }

    #[test]
    fn file_binary_content_is_preserved() {
        let dir = TempDir::new().unwrap();
        let payload = [0u8, 159, 146, 150, 255];
        fs::write(dir.path().join("blob"), payload).unwrap();
        let resolver = FileResolver::with_base_dir(dir.path());
        assert_eq!(
            resolver.resolve(&Context::new(), "file://blob").unwrap(),
            payload
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let resolver = FileResolver::with_base_dir(dir.path());
        let err = resolver
            .resolve(&Context::new(), "file://missing")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn empty_file_is_found_and_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("empty"), b"").unwrap();
        let resolver = FileResolver::with_base_dir(dir.path());
        assert!(
            resolver
                .resolve(&Context::new(), "file://empty")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn env_set_unset_and_empty() {
        let resolver = EnvResolver::from_vars([
            ("TOKEN".to_string(), "abc".to_string()),
            ("BLANK".to_string(), String::new()),
        ]);
        let ctx = Context::new();
        assert_eq!(resolver.resolve(&ctx, "env://TOKEN").unwrap(), b"abc");
        assert!(resolver.resolve(&ctx, "env://BLANK").unwrap().is_empty());
        assert!(resolver.resolve(&ctx, "env://NOPE").unwrap_err().is_not_found());
    }

    #[test]
    fn env_vars_hold_raw_bytes() {
        let resolver = EnvResolver::from_vars([("BLOB", vec![0xff, b'A', 0xfe])]);
        assert_eq!(
            resolver.resolve(&Context::new(), "env://BLOB").unwrap(),
            [0xff, b'A', 0xfe]
        );
    }

    #[cfg(feature = "http")]
    mod http {
        use super::*;
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::thread;
        use std::time::{Duration, Instant};

        /// Serve one request with `status` and `body`, after `delay`.
        fn serve_once(status: &'static str, body: &'static [u8], delay: Duration) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            thread::spawn(move || {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 512];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                thread::sleep(delay);
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
            });
            format!("http://{addr}/secret")
        }

        #[test]
        fn ok_body_is_returned_verbatim() {
            let uri = serve_once("200 OK", b"\xffpayload", Duration::ZERO);
            let bytes = HttpResolver::new().resolve(&Context::new(), &uri).unwrap();
            assert_eq!(bytes, b"\xffpayload");
        }

        #[test]
        fn status_404_is_not_found() {
            let uri = serve_once("404 Not Found", b"", Duration::ZERO);
            let err = HttpResolver::new()
                .resolve(&Context::new(), &uri)
                .unwrap_err();
            assert!(err.is_not_found(), "{err:?}");
        }

        #[test]
        fn server_error_is_a_failure() {
            let uri = serve_once("500 Internal Server Error", b"boom", Duration::ZERO);
            let err = HttpResolver::new()
                .resolve(&Context::new(), &uri)
                .unwrap_err();
            assert!(matches!(err, ResolveError::Backend { .. }), "{err:?}");
        }

        #[test]
        fn deadline_bounds_the_request() {
            let uri = serve_once("200 OK", b"late", Duration::from_secs(3));
            let ctx = Context::new().with_timeout(Duration::from_millis(200));
            let started = Instant::now();
            let err = HttpResolver::new().resolve(&ctx, &uri).unwrap_err();
            assert!(!err.is_not_found(), "{err:?}");
            assert!(started.elapsed() < Duration::from_secs(2));
        }
    }

    #[cfg(unix)]
    #[test]
    fn process_env_non_utf8_is_preserved() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = "LAYERFIG_BACKEND_TEST_BLOB";
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var(name, OsStr::from_bytes(&[0xff, b'A', 0xfe])) };
        let bytes = EnvResolver::process()
            .resolve(&Context::new(), &format!("env://{name}"))
            .unwrap();
        unsafe { std::env::remove_var(name) };
        assert_eq!(bytes, [0xff, b'A', 0xfe]);
    }
}
