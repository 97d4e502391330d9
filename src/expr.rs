//! The `${...}` template language used by `ref` URIs, `dsn` templates and
//! the document template pass.
//!
//! ```text
//! template := (text | "$${" | "${" expr "}")*
//! expr     := term ("|" filter)*
//! term     := "." path | "env:" arg | "ref:" arg
//! arg      := '"' quoted '"' | unquoted
//! filter   := "trim" | "upper" | "lower" | "urlencode" | "default(" '"' text '"' ")"
//! ```
//!
//! Arguments are themselves templates, so `${ref:file://${.dir}/token}`
//! works. Quoted arguments take `\"` and `\\` escapes; unquoted ones take
//! `\}`, `\|` and `\\` and are trimmed. `$${` is a literal `${`.
//!
//! Lookups go through a [`Scope`]. An undefined path, an unset variable or a
//! reference that is not found renders as the empty string, unless the
//! template is rendered strictly, in which case it is an error.

use thiserror::Error;

use crate::resolver::{ResolveError, normalize_uri};

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("syntax error at byte {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("unknown filter '{name}' at byte {pos}")]
    UnknownFilter { name: String, pos: usize },

    #[error("undefined {kind} '{name}'")]
    Undefined { kind: &'static str, name: String },

    #[error("content of '{uri}' is not valid UTF-8")]
    NotUtf8 { uri: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Where template lookups are answered.
pub trait Scope {
    /// Rendered value at a dotted field path, `None` when there is none.
    fn field(&self, path: &[&str]) -> Option<String> {
        let _ = path;
        None
    }

    /// Value of an environment variable, `None` when unset.
    fn env(&self, key: &str) -> Option<String>;

    /// Fetch an already normalized reference.
    fn resolve(&self, uri: &str) -> Result<Vec<u8>, ResolveError>;
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
struct Expr {
    term: Term,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Path(Vec<String>),
    Env(Template),
    Ref(Template),
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Trim,
    Upper,
    Lower,
    Default(String),
    #[cfg(feature = "url")]
    UrlEncode,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let mut parser = Parser { src: source, pos: 0 };
        parser.template(Mode::Top)
    }

    /// Whether the template contains any `${...}` expression.
    pub fn has_expressions(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Expr(_)))
    }

    pub fn render(&self, scope: &dyn Scope, strict: bool) -> Result<String, ExprError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&expr.evaluate(scope, strict)?),
            }
        }
        Ok(out)
    }
}

/// Parse and render `source` in one step.
pub fn render(source: &str, scope: &dyn Scope, strict: bool) -> Result<String, ExprError> {
    Template::parse(source)?.render(scope, strict)
}

struct Lookup {
    value: Option<String>,
    kind: &'static str,
    name: String,
}

impl Expr {
    fn evaluate(&self, scope: &dyn Scope, strict: bool) -> Result<String, ExprError> {
        let lookup = self.term.lookup(scope, strict)?;
        let value = self
            .filters
            .iter()
            .fold(lookup.value, |value, filter| filter.apply(value));
        match value {
            Some(value) => Ok(value),
            None if strict => Err(ExprError::Undefined {
                kind: lookup.kind,
                name: lookup.name,
            }),
            None => Ok(String::new()),
        }
    }
}

impl Term {
    fn lookup(&self, scope: &dyn Scope, strict: bool) -> Result<Lookup, ExprError> {
        match self {
            Term::Path(segments) => {
                let path: Vec<&str> = segments.iter().map(String::as_str).collect();
                Ok(Lookup {
                    value: scope.field(&path),
                    kind: "field",
                    name: format!(".{}", segments.join(".")),
                })
            }
            Term::Env(arg) => {
                let key = arg.render(scope, strict)?;
                Ok(Lookup {
                    value: scope.env(&key),
                    kind: "environment variable",
                    name: key,
                })
            }
            Term::Ref(arg) => {
                let uri = normalize_uri(&arg.render(scope, strict)?);
                let value = match scope.resolve(&uri) {
                    Ok(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => Some(text.trim().to_string()),
                        Err(_) => return Err(ExprError::NotUtf8 { uri }),
                    },
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e.into()),
                };
                Ok(Lookup {
                    value,
                    kind: "reference",
                    name: uri,
                })
            }
        }
    }
}

impl Filter {
    fn apply(&self, value: Option<String>) -> Option<String> {
        match self {
            Filter::Trim => value.map(|v| v.trim().to_string()),
            Filter::Upper => value.map(|v| v.to_uppercase()),
            Filter::Lower => value.map(|v| v.to_lowercase()),
            Filter::Default(fallback) => match value {
                Some(v) if !v.is_empty() => Some(v),
                _ => Some(fallback.clone()),
            },
            #[cfg(feature = "url")]
            Filter::UrlEncode => value.map(|v| {
                percent_encoding::utf8_percent_encode(&v, percent_encoding::NON_ALPHANUMERIC)
                    .to_string()
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Top,
    Quoted,
    Unquoted,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, message: &str) -> ExprError {
        ExprError::Syntax {
            pos: self.pos,
            message: message.to_string(),
        }
    }

    fn template(&mut self, mode: Mode) -> Result<Template, ExprError> {
        let mut parts = Vec::new();
        let mut literal = String::new();

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                match mode {
                    Mode::Top => break,
                    Mode::Quoted => return Err(self.error("unterminated string")),
                    Mode::Unquoted => return Err(self.error("unterminated expression, expected '}'")),
                }
            }

            if self.eat("$${") {
                literal.push_str("${");
                continue;
            }
            if rest.starts_with("${") {
                let open = self.pos;
                self.pos += 2;
                let expr = self.expr(open)?;
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Expr(expr));
                continue;
            }

            match mode {
                Mode::Top => {}
                Mode::Quoted => {
                    if self.eat("\\\"") {
                        literal.push('"');
                        continue;
                    }
                    if self.eat("\\\\") {
                        literal.push('\\');
                        continue;
                    }
                    if rest.starts_with('"') {
                        break;
                    }
                }
                Mode::Unquoted => {
                    if self.eat("\\}") {
                        literal.push('}');
                        continue;
                    }
                    if self.eat("\\|") {
                        literal.push('|');
                        continue;
                    }
                    if self.eat("\\\\") {
                        literal.push('\\');
                        continue;
                    }
                    if rest.starts_with('}') || rest.starts_with('|') {
                        break;
                    }
                }
            }

            match self.bump() {
                Some(c) => literal.push(c),
                None => break,
            }
        }

        if mode == Mode::Unquoted {
            literal.truncate(literal.trim_end().len());
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Template { parts })
    }

    fn expr(&mut self, open: usize) -> Result<Expr, ExprError> {
        self.skip_ws();
        let term = if self.eat(".") {
            Term::Path(self.path()?)
        } else if self.eat("env:") {
            Term::Env(self.argument()?)
        } else if self.eat("ref:") {
            Term::Ref(self.argument()?)
        } else {
            return Err(self.error("expected '.field', 'env:' or 'ref:'"));
        };

        let mut filters = Vec::new();
        loop {
            self.skip_ws();
            if self.eat("|") {
                self.skip_ws();
                filters.push(self.filter()?);
            } else if self.eat("}") {
                break;
            } else if self.peek().is_none() {
                return Err(ExprError::Syntax {
                    pos: open,
                    message: "unclosed '${'".into(),
                });
            } else {
                return Err(self.error("expected '|' or '}'"));
            }
        }
        Ok(Expr { term, filters })
    }

    fn path(&mut self) -> Result<Vec<String>, ExprError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            self.bump();
        }
        let raw = &self.src[start..self.pos];
        if raw.is_empty() {
            return Err(self.error("expected a field name after '.'"));
        }
        if raw.split('.').any(str::is_empty) {
            return Err(ExprError::Syntax {
                pos: start,
                message: format!("empty segment in path '.{raw}'"),
            });
        }
        Ok(raw.split('.').map(str::to_string).collect())
    }

    fn argument(&mut self) -> Result<Template, ExprError> {
        self.skip_ws();
        if self.eat("\"") {
            let template = self.template(Mode::Quoted)?;
            // `template` only stops on the closing quote.
            self.eat("\"");
            Ok(template)
        } else {
            self.template(Mode::Unquoted)
        }
    }

    fn filter(&mut self) -> Result<Filter, ExprError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let name = &self.src[start..self.pos];
        if name.is_empty() {
            return Err(self.error("expected a filter name"));
        }

        self.skip_ws();
        let argument = if self.eat("(") {
            self.skip_ws();
            if !self.eat("\"") {
                return Err(self.error("expected a quoted argument"));
            }
            let value = self.quoted_literal()?;
            self.skip_ws();
            if !self.eat(")") {
                return Err(self.error("expected ')'"));
            }
            Some(value)
        } else {
            None
        };

        let no_argument = |filter: Filter| match &argument {
            None => Ok(filter),
            Some(_) => Err(ExprError::Syntax {
                pos: start,
                message: format!("filter '{name}' takes no argument"),
            }),
        };

        match name {
            "trim" => no_argument(Filter::Trim),
            "upper" => no_argument(Filter::Upper),
            "lower" => no_argument(Filter::Lower),
            #[cfg(feature = "url")]
            "urlencode" => no_argument(Filter::UrlEncode),
            "default" => argument.clone().map(Filter::Default).ok_or(ExprError::Syntax {
                pos: start,
                message: "filter 'default' needs an argument".into(),
            }),
            other => Err(ExprError::UnknownFilter {
                name: other.to_string(),
                pos: start,
            }),
        }
    }

    fn quoted_literal(&mut self) -> Result<String, ExprError> {
        let mut out = String::new();
        loop {
            if self.eat("\\\"") {
                out.push('"');
            } else if self.eat("\\\\") {
                out.push('\\');
            } else if self.eat("\"") {
                return Ok(out);
            } else {
                match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                }
            }
        }
    }
}
