//! Raw documents and their parsing into the common JSON tree.

use serde_json::{Map, Value};

use crate::env::Environment;
use crate::error::LayerfigError;
use crate::expr::{self, Scope};
use crate::resolver::{Context, ResolveError, Resolvers};
use crate::types::Format;

/// One source document, in precedence order with its siblings.
#[derive(Debug, Clone)]
pub struct Document {
    /// Identifier used in errors: a file path or a caller-chosen name.
    pub origin: String,
    pub content: Vec<u8>,
    pub format: Format,
}

impl Document {
    pub fn new(origin: impl Into<String>, content: impl Into<Vec<u8>>, format: Format) -> Self {
        Self {
            origin: origin.into(),
            content: content.into(),
            format,
        }
    }

    fn text(&self) -> Result<&str, LayerfigError> {
        std::str::from_utf8(&self.content).map_err(|e| LayerfigError::ParseError {
            origin: self.origin.clone(),
            source: Box::new(e),
        })
    }

    /// Parse into a mapping. An empty document is an empty mapping.
    pub fn parse(&self) -> Result<Map<String, Value>, LayerfigError> {
        let text = self.text()?;
        let parse_error = |source: crate::BoxError| LayerfigError::ParseError {
            origin: self.origin.clone(),
            source,
        };

        let value: Value = match self.format {
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(Box::new(e)))?,
            Format::Json if text.trim().is_empty() => Value::Null,
            Format::Json => serde_json::from_str(text).map_err(|e| parse_error(Box::new(e)))?,
            Format::Toml => toml::from_str(text).map_err(|e| parse_error(Box::new(e)))?,
        };

        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(parse_error(
                format!("document root must be a mapping, found {}", kind(&other)).into(),
            )),
        }
    }

    /// Expand `${env:..}` and `${ref:..}` in the raw text before parsing.
    pub fn expand_templates(&mut self, scope: &dyn Scope) -> Result<(), LayerfigError> {
        let text = self.text()?;
        let expanded = expr::render(text, scope, false).map_err(|source| LayerfigError::Template {
            origin: self.origin.clone(),
            source,
        })?;
        self.content = expanded.into_bytes();
        Ok(())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Template lookups available to whole documents: no struct is in scope,
/// so `${.field}` paths are undefined.
pub(crate) struct DocumentScope<'a> {
    pub env: &'a Environment,
    pub resolvers: &'a Resolvers,
    pub context: &'a Context,
}

impl Scope for DocumentScope<'_> {
    fn env(&self, key: &str) -> Option<String> {
        self.env.lookup(key).map(|value| value.into_owned())
    }

    fn resolve(&self, uri: &str) -> Result<Vec<u8>, ResolveError> {
        self.resolvers.resolve(self.context, uri)
    }
}
