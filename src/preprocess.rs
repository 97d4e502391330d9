//! Type-directed rewrites of the merged document tree before decoding.
//!
//! The record's descriptor says what each key will become, so unit suffixes
//! can be expanded where the target understands the result:
//!
//! - duration targets: day-suffixed strings are widened to hours (`1.5d` →
//!   `36h`), a form every duration deserializer accepts;
//! - integer targets: human-readable sizes (`1KiB`, `2 MB`) become numbers.
//!   Size strings aimed at text fields are left untouched.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::LayerfigError;
use crate::meta::{RecordDescriptor, Shape};
use crate::units;

/// Rewrite `tree` in place against `descriptor`. Unknown keys are left for
/// the strict-mode check.
pub fn preprocess(tree: &mut Map<String, Value>, descriptor: &RecordDescriptor) -> Result<(), LayerfigError> {
    preprocess_record(tree, descriptor, "")
}

fn preprocess_record(
    tree: &mut Map<String, Value>,
    descriptor: &RecordDescriptor,
    prefix: &str,
) -> Result<(), LayerfigError> {
    for (key, value) in tree.iter_mut() {
        let Some(field) = descriptor.field(key) else {
            continue;
        };
        let path = join(prefix, key);
        rewrite(value, (field.shape)(), &path)?;
    }
    Ok(())
}

fn rewrite(value: &mut Value, shape: Shape, path: &str) -> Result<(), LayerfigError> {
    match (shape, value) {
        (Shape::Duration, Value::String(text)) if units::has_day_unit(text) => {
            let delta = units::parse_duration(text).map_err(|e| invalid(path, e))?;
            let widened = units::format_duration(delta);
            trace!(key = %path, from = %text, to = %widened, "widened day duration");
            *text = widened;
        }
        (Shape::Integer, value) => {
            let Value::String(text) = &*value else {
                return Ok(());
            };
            if !units::has_size_unit(text) {
                return Ok(());
            }
            let bytes = units::parse_byte_size(text).map_err(|e| invalid(path, e))?;
            let number = if let Ok(n) = i64::try_from(bytes) {
                Value::from(n)
            } else if let Ok(n) = u64::try_from(bytes) {
                Value::from(n)
            } else {
                return Err(invalid(path, format!("'{text}' does not fit in 64 bits")));
            };
            trace!(key = %path, from = %text, to = %number, "expanded byte size");
            *value = number;
        }
        (Shape::Record(descriptor), Value::Object(map)) => {
            preprocess_record(map, descriptor(), path)?;
        }
        (Shape::Seq(inner), Value::Array(items)) => {
            for (index, item) in items.iter_mut().enumerate() {
                rewrite(item, inner(), &join(path, &index.to_string()))?;
            }
        }
        (Shape::Map(inner), Value::Object(map)) => {
            for (key, item) in map.iter_mut() {
                rewrite(item, inner(), &join(path, key))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid(path: &str, reason: impl ToString) -> LayerfigError {
    LayerfigError::InvalidValue {
        key: path.to_string(),
        reason: reason.to_string(),
    }
}
