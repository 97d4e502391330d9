use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::OsString;

/// Snapshot of environment variables plus the prefix applied to `env`
/// attribute names and `${env:KEY}` lookups.
///
/// With prefix `MYAPP`, the key `DB_USER` reads `MYAPP_DB_USER`. No extra
/// separator is inserted when the prefix already ends in `_`. Takes an
/// iterator so tests can pass synthetic data instead of `std::env::vars()`.
/// Values are kept as raw bytes.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    prefix: Option<String>,
    vars: HashMap<String, Vec<u8>>,
}

impl Environment {
    /// An environment with no variables; every lookup is unset.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    ///
    /// Names that are not valid Unicode are decoded lossily; values are kept
    /// byte for byte.
    pub fn from_process(prefix: Option<&str>) -> Self {
        let vars = std::env::vars_os().map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                OsString::into_encoded_bytes(v),
            )
        });
        Self::from_vars(prefix, vars)
    }

    pub fn from_vars<I, K, V>(prefix: Option<&str>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The full variable name read for `key`.
    pub fn qualified(&self, key: &str) -> String {
        match &self.prefix {
            None => key.to_string(),
            Some(prefix) if prefix.ends_with('_') => format!("{prefix}{key}"),
            Some(prefix) => format!("{prefix}_{key}"),
        }
    }

    /// Raw value of the prefixed variable. `Some(b"")` means set but empty.
    pub fn lookup_bytes(&self, key: &str) -> Option<&[u8]> {
        self.vars.get(&self.qualified(key)).map(Vec::as_slice)
    }

    /// Text value of the prefixed variable, for templates.
    pub fn lookup(&self, key: &str) -> Option<Cow<'_, str>> {
        self.lookup_bytes(key).map(String::from_utf8_lossy)
    }
}
