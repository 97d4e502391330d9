//! String → typed value conversion helpers shared by the [`Scan`] impls.
//!
//! [`Scan`]: crate::Scan

use std::error::Error as StdError;

use thiserror::Error;

use crate::units;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid {type_name} '{value}': {reason}")]
    Invalid {
        value: String,
        type_name: &'static str,
        reason: String,
    },

    #[error("'{value}' overflows {type_name}")]
    Overflow {
        value: String,
        type_name: &'static str,
    },

    #[error("'{value}' is not a whole number of bytes")]
    Fractional { value: String },

    #[error("value is not valid UTF-8")]
    NotUtf8,

    #[error("{type_name} cannot be assigned from a string")]
    Unsupported { type_name: &'static str },

    #[error(transparent)]
    Custom(BoxError),
}

impl ConvertError {
    pub fn invalid(value: &str, type_name: &'static str, reason: impl Into<String>) -> Self {
        ConvertError::Invalid {
            value: value.to_string(),
            type_name,
            reason: reason.into(),
        }
    }

    pub fn custom<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ConvertError::Custom(err.into())
    }
}

/// Decode raw resolved content as text.
pub fn text(raw: &[u8]) -> Result<&str, ConvertError> {
    std::str::from_utf8(raw).map_err(|_| ConvertError::NotUtf8)
}

/// Content that is empty or whitespace only. Scalars take it as their zero
/// value: a set-but-empty source still settles the field.
pub fn is_blank(raw: &[u8]) -> bool {
    raw.trim_ascii().is_empty()
}

/// Parse a boolean the way `strconv.ParseBool`-style configs expect.
pub fn parse_bool(input: &str) -> Result<bool, ConvertError> {
    match input.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(ConvertError::invalid(other, "bool", "expected true or false")),
    }
}

/// Parse an integer literal or a byte size, then narrow it to `T`.
///
/// Plain literals may use `0x`, `0o` or `0b` prefixes and `_` separators.
/// Anything else is handed to [`units::parse_byte_size`]. Narrowing fails on
/// overflow instead of wrapping.
pub fn parse_integer<T>(input: &str, type_name: &'static str) -> Result<T, ConvertError>
where
    T: TryFrom<i128>,
{
    let text = input.trim();
    let wide = match parse_integer_literal(text) {
        Some(Ok(value)) => value,
        Some(Err(())) => {
            return Err(ConvertError::Overflow {
                value: text.to_string(),
                type_name,
            });
        }
        None => units::parse_byte_size(text).map_err(|err| match err {
            ConvertError::Invalid { reason, .. } => ConvertError::Invalid {
                value: text.to_string(),
                type_name,
                reason,
            },
            ConvertError::Overflow { value, .. } => ConvertError::Overflow { value, type_name },
            other => other,
        })?,
    };

    T::try_from(wide).map_err(|_| ConvertError::Overflow {
        value: text.to_string(),
        type_name,
    })
}

/// `None` when `text` is not an integer literal at all, `Some(Err)` when it
/// is one but doesn't fit in an `i128`.
fn parse_integer_literal(text: &str) -> Option<Result<i128, ()>> {
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = match body.get(..2) {
        Some("0x") | Some("0X") => (16, &body[2..]),
        Some("0o") | Some("0O") => (8, &body[2..]),
        Some("0b") | Some("0B") => (2, &body[2..]),
        _ => (10, body),
    };

    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let magnitude = match u128::from_str_radix(&cleaned, radix) {
        Ok(m) => m,
        Err(_) => return Some(Err(())),
    };
    let value = if negative {
        if magnitude > i128::MAX as u128 + 1 {
            return Some(Err(()));
        }
        (magnitude as i128).wrapping_neg()
    } else {
        match i128::try_from(magnitude) {
            Ok(v) => v,
            Err(_) => return Some(Err(())),
        }
    };
    Some(Ok(value))
}

pub fn parse_f64(input: &str) -> Result<f64, ConvertError> {
    input
        .trim()
        .parse::<f64>()
        .map_err(|e| ConvertError::invalid(input, "f64", e.to_string()))
}

pub fn parse_f32(input: &str) -> Result<f32, ConvertError> {
    let wide = parse_f64(input)?;
    let narrow = wide as f32;
    if wide.is_finite() && !narrow.is_finite() {
        return Err(ConvertError::Overflow {
            value: input.trim().to_string(),
            type_name: "f32",
        });
    }
    Ok(narrow)
}

/// Split a comma-separated list using CSV quoting rules.
///
/// `a,"b,c",d` yields `["a", "b,c", "d"]`. Surrounding whitespace is trimmed
/// from each item; empty input yields no items.
pub fn split_list(input: &str) -> Result<Vec<String>, ConvertError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ConvertError::invalid(input, "list", e.to_string()))?;
        items.extend(record.iter().map(str::to_string));
    }
    Ok(items)
}

/// Split a comma-separated list of `key:value` entries.
pub fn split_pairs(input: &str) -> Result<Vec<(String, String)>, ConvertError> {
    split_list(input)?
        .into_iter()
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| ConvertError::invalid(&entry, "map entry", "expected key:value"))
        })
        .collect()
}
