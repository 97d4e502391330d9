use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::convert::{BoxError, ConvertError};
use crate::expr::ExprError;
use crate::resolver::ResolveError;

/// The field attribute whose step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Env,
    Ref,
    RefFrom,
    Default,
    Dsn,
    SetDefaults,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tag::Env => "env",
            Tag::Ref => "ref",
            Tag::RefFrom => "ref_from",
            Tag::Default => "default",
            Tag::Dsn => "dsn",
            Tag::SetDefaults => "set_defaults",
        })
    }
}

#[derive(Debug, Error)]
pub enum FieldCause {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Expression(#[from] ExprError),

    #[error("dsn fields must hold a string, found {shape}")]
    NotAString { shape: String },

    #[error("ref_from names unknown field '{name}'")]
    UnknownSibling { name: String },

    #[error("{0}")]
    Hook(BoxError),
}

/// One failed field: where, which attribute, and why.
#[derive(Debug, Error)]
#[error("field '{path}' ({tag}): {cause}")]
pub struct FieldError {
    pub path: String,
    pub tag: Tag,
    #[source]
    pub cause: FieldCause,
}

impl FieldError {
    pub fn new(path: impl Into<String>, tag: Tag, cause: impl Into<FieldCause>) -> Self {
        Self {
            path: path.into(),
            tag,
            cause: cause.into(),
        }
    }
}

/// A finding reported by a caller-supplied validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum LayerfigError {
    #[error("Failed to load {origin}: {}", join(.errors))]
    Load {
        origin: String,
        errors: Vec<FieldError>,
    },

    /// A field error raised by a bare [`Walker`](crate::Walker); `load` and
    /// `populate` report it wrapped in [`Load`](Self::Load).
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("Cycle detected: {type_name} reached twice at '{path}'")]
    Cycle {
        type_name: &'static str,
        path: String,
    },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Unknown key '{key}' in {origin} (line {line})")]
    UnknownKey {
        key: String,
        origin: String,
        line: usize,
    },

    #[error("Unknown keys in configuration: {}", join(.0))]
    UnknownKeys(Vec<LayerfigError>),

    #[error("Failed to parse {origin}: {source}")]
    ParseError { origin: String, source: BoxError },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode configuration: {source}")]
    DecodeError { source: serde_json::Error },

    #[error("Failed to expand templates in {origin}: {source}")]
    Template { origin: String, source: ExprError },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("App name is required to discover files; call .app_name() or .file_name() on the builder")]
    AppNameRequired,
}

impl LayerfigError {
    /// Wrap a bare field error with the identifier of the load it belongs to.
    pub(crate) fn with_origin(self, origin: &str) -> Self {
        match self {
            LayerfigError::Field(err) => LayerfigError::Load {
                origin: origin.to_string(),
                errors: vec![err],
            },
            other => other,
        }
    }

    /// The field errors carried by this error, if any.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            LayerfigError::Load { errors, .. } => errors,
            LayerfigError::Field(err) => std::slice::from_ref(err),
            _ => &[],
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
