//! Decoding the merged tree, with strict-mode detection of unknown keys.
//!
//! Uses `serde_ignored` to deserialize into `C` and capture any keys that `C`
//! doesn't consume. Each unknown key is reported with the document it came
//! from and a best-effort line number.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::LayerfigError;
use crate::types::Format;

/// Decode `tree` into `C`. In strict mode, keys `C` ignores are errors.
///
/// `documents` are only used to attribute unknown keys: the origin is the
/// last (highest-priority) document that contains the key.
pub fn decode<C: DeserializeOwned>(
    tree: Map<String, Value>,
    documents: &[Document],
    strict: bool,
) -> Result<C, LayerfigError> {
    let mut unknown_keys: Vec<String> = Vec::new();

    let config: C = serde_ignored::deserialize(Value::Object(tree), |ignored_path| {
        unknown_keys.push(clean_path(&ignored_path.to_string()));
    })
    .map_err(|source| LayerfigError::DecodeError { source })?;

    if !strict || unknown_keys.is_empty() {
        return Ok(config);
    }

    let errors: Vec<LayerfigError> = unknown_keys
        .into_iter()
        .map(|key| locate(key, documents))
        .collect();

    Err(LayerfigError::UnknownKeys(errors))
}

/// `serde_ignored` marks `Option` and newtype layers with a `?` segment.
fn clean_path(path: &str) -> String {
    path.split('.')
        .filter(|segment| *segment != "?")
        .collect::<Vec<_>>()
        .join(".")
}

fn locate(key: String, documents: &[Document]) -> LayerfigError {
    for document in documents.iter().rev() {
        let Ok(tree) = document.parse() else {
            continue;
        };
        if !contains_key(&tree, &key) {
            continue;
        }
        let line = std::str::from_utf8(&document.content)
            .map(|content| find_key_line(content, &key, document.format))
            .unwrap_or(0);
        return LayerfigError::UnknownKey {
            key,
            origin: document.origin.clone(),
            line,
        };
    }

    LayerfigError::UnknownKey {
        key,
        origin: "<override>".into(),
        line: 0,
    }
}

fn contains_key(tree: &Map<String, Value>, dotted_key: &str) -> bool {
    let mut segments = dotted_key.split('.');
    let Some(first) = segments.next() else {
        return false;
    };
    let Some(mut current) = tree.get(first) else {
        return false;
    };
    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return false,
        }
    }
    true
}

/// Find the 1-indexed line number for a key in a document.
///
/// Best-effort heuristic; returns 0 if the key cannot be located.
fn find_key_line(content: &str, dotted_key: &str, format: Format) -> usize {
    match format {
        Format::Toml => find_toml_key_line(content, dotted_key),
        Format::Yaml => find_yaml_key_line(content, dotted_key),
        Format::Json => find_json_key_line(content, dotted_key),
    }
}

/// For a dotted key like `"database.typo"`, tracks the current `[section]`
/// header while scanning and only matches the leaf key when inside the
/// correct section. Does not handle quoted keys or inline tables.
fn find_toml_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let leaf = segments.last().unwrap_or(&dotted_key);
    let expected_section = &segments[..segments.len() - 1]; // empty for top-level

    let mut current_section: Vec<String> = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') && !trimmed.starts_with("[[") {
            let header = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
            current_section = header.split('.').map(|s| s.trim().to_string()).collect();
            continue;
        }

        let in_right_section = expected_section.len() == current_section.len()
            && expected_section
                .iter()
                .zip(&current_section)
                .all(|(a, b)| *a == b);

        if in_right_section
            && let Some(after_key) = trimmed.strip_prefix(leaf)
            && after_key.trim_start().starts_with('=')
        {
            return i + 1;
        }
    }
    0
}

/// Tracks block-mapping nesting by indentation: each segment must appear as
/// `segment:` deeper than the previous one. Flow mappings are not handled.
fn find_yaml_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let mut depth = 0;
    let mut parent_indent: Option<usize> = None;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();

        // Left the matched parent's block: start over from the top.
        if let Some(parent) = parent_indent
            && indent <= parent
        {
            depth = 0;
            parent_indent = None;
            if indent > 0 {
                continue;
            }
        }

        let Some(after_key) = trimmed.strip_prefix(segments[depth]) else {
            continue;
        };
        if !after_key.trim_start().starts_with(':') {
            continue;
        }
        if depth + 1 == segments.len() {
            return i + 1;
        }
        depth += 1;
        parent_indent = Some(indent);
    }
    0
}

/// Finds the quoted leaf key after each of its parents has been seen, in
/// order. Good enough for pretty-printed documents.
fn find_json_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let mut depth = 0;

    for (i, line) in content.lines().enumerate() {
        let quoted = format!("\"{}\"", segments[depth]);
        let Some(pos) = line.find(&quoted) else {
            continue;
        };
        if !line[pos + quoted.len()..].trim_start().starts_with(':') {
            continue;
        }
        if depth + 1 == segments.len() {
            return i + 1;
        }
        depth += 1;
    }
    0
}
