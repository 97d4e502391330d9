//! Convert dotted-key programmatic overrides into a nested mapping.
//!
//! Each `("database.url", Value)` pair is expanded into the nested structure
//! needed for deep-merge with the document layers.

use serde_json::{Map, Value};

use crate::error::LayerfigError;
use crate::meta::{RecordDescriptor, Shape};

/// Convert dotted-key overrides into a nested mapping.
///
/// `("database.url", "pg://")` becomes `{"database": {"url": "pg://"}}`.
/// If multiple entries target the same key, the last one wins.
pub fn overrides_to_map(entries: &[(String, Value)]) -> Result<Map<String, Value>, LayerfigError> {
    let mut map = Map::new();
    for (dotted_key, value) in entries {
        set_nested(&mut map, dotted_key, value.clone())?;
    }
    Ok(map)
}

fn set_nested(map: &mut Map<String, Value>, dotted_key: &str, value: Value) -> Result<(), LayerfigError> {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(LayerfigError::InvalidValue {
            key: dotted_key.to_string(),
            reason: "empty key segment".into(),
        });
    }

    let (leaf, parents) = segments.split_last().ok_or_else(|| LayerfigError::InvalidValue {
        key: dotted_key.to_string(),
        reason: "empty key".into(),
    })?;

    let mut current = map;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(next) => next,
            _ => {
                return Err(LayerfigError::InvalidValue {
                    key: dotted_key.to_string(),
                    reason: format!("'{segment}' is already set to a non-mapping value"),
                });
            }
        };
    }

    current.insert(leaf.to_string(), value);
    Ok(())
}

/// Whether `dotted_key` names a field of the record, by document key.
///
/// Keys below a map-shaped field are free-form, and keys below an opaque
/// field cannot be checked, so both are accepted.
pub fn is_known_key(descriptor: &RecordDescriptor, dotted_key: &str) -> bool {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    known_in_record(descriptor, &segments)
}

fn known_in_record(descriptor: &RecordDescriptor, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Some(field) = descriptor.fields.iter().find(|f| f.key == *first) else {
        return false;
    };
    rest.is_empty() || known_in_shape((field.shape)(), rest)
}

fn known_in_shape(shape: Shape, rest: &[&str]) -> bool {
    match shape {
        Shape::Record(descriptor) => known_in_record(descriptor(), rest),
        Shape::Map(_) | Shape::Opaque => true,
        Shape::Seq(inner) => match rest.split_first() {
            Some((index, tail)) => {
                index.parse::<usize>().is_ok() && (tail.is_empty() || known_in_shape(inner(), tail))
            }
            None => true,
        },
        _ => false,
    }
}
