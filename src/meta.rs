//! Static field descriptors generated by `#[derive(Record)]`.
//!
//! A [`RecordDescriptor`] is the Rust stand-in for runtime struct
//! introspection: one entry per walked field, carrying the field's tags and a
//! [`Shape`] that lets the document preprocessors walk a parsed tree in step
//! with the record's types without holding an instance.

use std::fmt;

/// Kind of value a field holds, as far as the engine cares.
///
/// Nested shapes are stored as function pointers so that self-referential
/// records (`next: Option<Box<Node>>`) don't recurse at construction time.
#[derive(Clone, Copy)]
pub enum Shape {
    Bool,
    Integer,
    Float,
    Text,
    Bytes,
    Duration,
    Record(fn() -> &'static RecordDescriptor),
    Seq(fn() -> Shape),
    Map(fn() -> Shape),
    Opaque,
}

impl Shape {
    pub fn is_text(&self) -> bool {
        matches!(self, Shape::Text)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Bool => f.write_str("Bool"),
            Shape::Integer => f.write_str("Integer"),
            Shape::Float => f.write_str("Float"),
            Shape::Text => f.write_str("Text"),
            Shape::Bytes => f.write_str("Bytes"),
            Shape::Duration => f.write_str("Duration"),
            Shape::Record(desc) => write!(f, "Record({})", desc().type_name),
            Shape::Seq(inner) => write!(f, "Seq({:?})", inner()),
            Shape::Map(inner) => write!(f, "Map({:?})", inner()),
            Shape::Opaque => f.write_str("Opaque"),
        }
    }
}

/// The tag set declared on one field.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tags {
    pub default: Option<&'static str>,
    pub env: Option<&'static str>,
    pub reference: Option<&'static str>,
    pub reference_from: Option<&'static str>,
    pub dsn: Option<&'static str>,
    pub dsn_strict: bool,
}

impl Tags {
    pub const NONE: Tags = Tags {
        default: None,
        env: None,
        reference: None,
        reference_from: None,
        dsn: None,
        dsn_strict: false,
    };
}

#[derive(Debug)]
pub struct FieldDescriptor {
    /// Rust field name, used in error paths and `${.name}` lookups.
    pub name: &'static str,
    /// Key of the field in a parsed document (serde rename aware).
    pub key: &'static str,
    pub tags: Tags,
    pub shape: fn() -> Shape,
}

#[derive(Debug)]
pub struct RecordDescriptor {
    pub type_name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl RecordDescriptor {
    /// Index of the field whose Rust name or document key is `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| self.fields.iter().position(|f| f.key == name))
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.position(name).map(|i| &self.fields[i])
    }
}
