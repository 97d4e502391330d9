//! Unit-aware numeric parsing: byte sizes and durations with a day suffix.
//!
//! Both parsers do their arithmetic in [`Decimal`] so that fractional inputs
//! (`0.5MiB`, `1.5d`) are exact and values beyond the 64-bit range are
//! reported instead of wrapping.

use std::str::FromStr;

use chrono::TimeDelta;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::convert::ConvertError;

const SIZE_UNITS: &[(&str, u64)] = &[
    ("b", 1),
    ("k", 1_000),
    ("kb", 1_000),
    ("ki", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1_000_000),
    ("mb", 1_000_000),
    ("mi", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1_000_000_000),
    ("gb", 1_000_000_000),
    ("gi", 1 << 30),
    ("gib", 1 << 30),
    ("t", 1_000_000_000_000),
    ("tb", 1_000_000_000_000),
    ("ti", 1 << 40),
    ("tib", 1 << 40),
    ("p", 1_000_000_000_000_000),
    ("pb", 1_000_000_000_000_000),
    ("pi", 1 << 50),
    ("pib", 1 << 50),
    ("e", 1_000_000_000_000_000_000),
    ("eb", 1_000_000_000_000_000_000),
    ("ei", 1 << 60),
    ("eib", 1 << 60),
];

const NANOS_PER_UNIT: &[(&str, i64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
    ("d", 86_400 * 1_000_000_000),
];

/// Parse a byte size such as `1KiB`, `1.5 MB` or `42` into a byte count.
///
/// Units are case-insensitive; binary units (`KiB`, `Ki`) are powers of 1024,
/// decimal ones (`KB`, `K`) powers of 1000. A bare number is a byte count.
/// The result must be a whole number of bytes.
pub fn parse_byte_size(input: &str) -> Result<i128, ConvertError> {
    let text = input.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number = number.trim();
    let unit = unit.trim().to_ascii_lowercase();

    if number.is_empty() {
        return Err(ConvertError::invalid(input, "byte size", "missing number"));
    }

    let multiplier = if unit.is_empty() {
        1
    } else {
        SIZE_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| {
                ConvertError::invalid(input, "byte size", format!("unknown unit '{unit}'"))
            })?
    };

    // Parsed exactly: digits past the representable scale are an error, not
    // rounded away. Trailing fractional zeros are dropped first.
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    let value = Decimal::from_str_exact(number)
        .map_err(|e| ConvertError::invalid(input, "byte size", e.to_string()))?;
    let bytes = value
        .checked_mul(Decimal::from(multiplier))
        .ok_or_else(|| ConvertError::Overflow {
            value: input.to_string(),
            type_name: "byte size",
        })?;

    if !bytes.fract().is_zero() {
        return Err(ConvertError::Fractional {
            value: input.to_string(),
        });
    }

    bytes.to_i128().ok_or_else(|| ConvertError::Overflow {
        value: input.to_string(),
        type_name: "byte size",
    })
}

/// Whether `input` carries a recognised size unit (`"1KiB"` yes, `"10"` no).
pub fn has_size_unit(input: &str) -> bool {
    let text = input.trim();
    let Some(split) = text.find(|c: char| c.is_ascii_alphabetic()) else {
        return false;
    };
    let (number, unit) = text.split_at(split);
    let unit = unit.trim().to_ascii_lowercase();
    !number.trim().is_empty() && SIZE_UNITS.iter().any(|(name, _)| *name == unit)
}

/// Parse a duration such as `1h30m`, `2d`, `1.5d` or `-250ms`.
///
/// Accepts an optional sign followed by one or more `<decimal><unit>` pairs
/// with units `ns`, `us` (`µs`), `ms`, `s`, `m`, `h` and `d` (24 hours). A
/// bare `0` is allowed.
pub fn parse_duration(input: &str) -> Result<TimeDelta, ConvertError> {
    let text = input.trim();
    let (negative, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(ConvertError::invalid(input, "duration", "empty duration"));
    }

    let mut total = Decimal::ZERO;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(ConvertError::invalid(input, "duration", "expected a number"));
        }
        let number = Decimal::from_str(&rest[..digits])
            .map_err(|e| ConvertError::invalid(input, "duration", e.to_string()))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let nanos = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, n)| *n)
            .ok_or_else(|| {
                if unit.is_empty() {
                    ConvertError::invalid(input, "duration", "missing unit")
                } else {
                    ConvertError::invalid(input, "duration", format!("unknown unit '{unit}'"))
                }
            })?;

        let part = number
            .checked_mul(Decimal::from(nanos))
            .ok_or_else(|| duration_overflow(input))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| duration_overflow(input))?;
    }

    if negative {
        total.set_sign_negative(true);
    }

    // Sub-nanosecond remainders are truncated.
    let nanos = total.trunc().to_i64().ok_or_else(|| duration_overflow(input))?;
    Ok(TimeDelta::nanoseconds(nanos))
}

fn duration_overflow(input: &str) -> ConvertError {
    ConvertError::Overflow {
        value: input.to_string(),
        type_name: "duration",
    }
}

/// Whether a duration literal uses the day unit.
pub fn has_day_unit(input: &str) -> bool {
    let text = input.trim();
    text.char_indices().any(|(i, c)| {
        c == 'd' && text[..i].ends_with(|p: char| p.is_ascii_digit() || p == '.')
    })
}

/// Format a duration in hour-based form (`36h`, `1h30m`, `-24h`, `1.5s`).
///
/// The output never uses the day unit, so parsers that only know the
/// standard suffixes accept it.
pub fn format_duration(delta: TimeDelta) -> String {
    if delta.is_zero() {
        return "0s".to_string();
    }

    let mut out = String::new();
    let mut nanos = i128::from(delta.num_nanoseconds().unwrap_or_else(|| {
        // Outside the i64 nanosecond range; second precision is plenty there.
        delta.num_seconds().saturating_mul(1_000_000_000)
    }));
    if nanos < 0 {
        out.push('-');
        nanos = -nanos;
    }

    let hours = nanos / 3_600_000_000_000;
    nanos %= 3_600_000_000_000;
    let minutes = nanos / 60_000_000_000;
    nanos %= 60_000_000_000;

    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if nanos > 0 {
        let seconds = Decimal::from_i128_with_scale(nanos, 9).normalize();
        out.push_str(&format!("{seconds}s"));
    }
    out
}
