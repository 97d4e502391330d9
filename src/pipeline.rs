//! The per-field source chain.
//!
//! Order: `env`, then `ref_from` / `ref`, then `default`. A set variable or a
//! found reference settles the field, even when empty. Otherwise each step
//! only fills a field that is still zero. `dsn` templates run in a second
//! pass over the struct, after every sibling has been through the chain.

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::error::{FieldCause, FieldError, Tag};
use crate::expr::{self, Scope};
use crate::record::{Record, render_record_path};
use crate::resolver::{ResolveError, normalize_uri};
use crate::walk::Walker;

/// Template lookups against the struct being resolved.
struct RecordScope<'r, 'w, R> {
    record: &'r R,
    walker: &'r Walker<'w>,
}

impl<R: Record> Scope for RecordScope<'_, '_, R> {
    fn field(&self, path: &[&str]) -> Option<String> {
        render_record_path(self.record, path)
    }

    fn env(&self, key: &str) -> Option<String> {
        self.walker.env().lookup(key).map(Cow::into_owned)
    }

    fn resolve(&self, uri: &str) -> Result<Vec<u8>, ResolveError> {
        self.walker.resolvers().resolve(self.walker.context(), uri)
    }
}

/// Apply `env`, `ref_from`, `ref` and `default` to field `index`.
///
/// Returns whether the field was settled by a set variable or a found
/// reference.
pub(crate) fn apply_sources<R: Record>(
    walker: &Walker<'_>,
    record: &mut R,
    index: usize,
) -> Result<bool, FieldError> {
    let tags = &R::descriptor().fields[index].tags;
    if tags.env.is_none()
        && tags.reference.is_none()
        && tags.reference_from.is_none()
        && tags.default.is_none()
    {
        return Ok(false);
    }
    let path = walker.path();

    if let Some(key) = tags.env {
        let env = walker.env();
        let var = env.qualified(key);
        if let Some(value) = env.lookup_bytes(key) {
            record
                .field_mut(index)
                .scan(value)
                .map_err(|e| FieldError::new(&path, Tag::Env, e))?;
            debug!(field = %path, %var, "applied env");
            return Ok(true);
        }
        trace!(field = %path, %var, "env unset");
    }

    if !record.field(index).is_zero() {
        trace!(field = %path, "already set");
        return Ok(false);
    }

    if let Some(sibling) = tags.reference_from {
        let uri = sibling_uri(record, sibling)
            .map_err(|cause| FieldError::new(&path, Tag::RefFrom, cause))?;
        match uri {
            Some(uri) => {
                if let Some(bytes) = fetch(walker, record, &uri, Tag::RefFrom, &path)? {
                    assign(record, index, &bytes, Tag::RefFrom, &path)?;
                    debug!(field = %path, %sibling, "applied ref_from");
                    return Ok(true);
                }
            }
            None => trace!(field = %path, %sibling, "ref_from yielded no uri"),
        }
    }

    if let Some(uri) = tags.reference
        && let Some(bytes) = fetch(walker, record, uri, Tag::Ref, &path)?
    {
        assign(record, index, &bytes, Tag::Ref, &path)?;
        debug!(field = %path, "applied ref");
        return Ok(true);
    }

    if let Some(literal) = tags.default
        && record.field(index).is_zero()
    {
        assign(record, index, literal.as_bytes(), Tag::Default, &path)?;
        debug!(field = %path, "applied default");
    }

    Ok(false)
}

/// Render the `dsn` template of field `index` if it is still zero.
pub(crate) fn apply_derived<R: Record>(
    walker: &Walker<'_>,
    record: &mut R,
    index: usize,
) -> Result<(), FieldError> {
    let tags = &R::descriptor().fields[index].tags;
    let Some(template) = tags.dsn else {
        return Ok(());
    };
    let path = walker.path();
    if !record.field(index).is_zero() {
        trace!(field = %path, "already set, dsn skipped");
        return Ok(());
    }

    let scope = RecordScope {
        record: &*record,
        walker,
    };
    let value = expr::render(template, &scope, tags.dsn_strict)
        .map_err(|e| FieldError::new(&path, Tag::Dsn, e))?;
    assign(record, index, value.as_bytes(), Tag::Dsn, &path)?;
    debug!(field = %path, "applied dsn");
    Ok(())
}

fn assign<R: Record>(
    record: &mut R,
    index: usize,
    raw: &[u8],
    tag: Tag,
    path: &str,
) -> Result<(), FieldError> {
    record
        .field_mut(index)
        .scan(raw)
        .map_err(|e| FieldError::new(path, tag, e))
}

/// The URI a `ref_from` sibling provides: its rendered value, or its
/// `default` literal while it is still zero.
fn sibling_uri<R: Record>(record: &R, sibling: &str) -> Result<Option<String>, FieldCause> {
    let descriptor = R::descriptor();
    let index = descriptor
        .position(sibling)
        .ok_or_else(|| FieldCause::UnknownSibling {
            name: sibling.to_string(),
        })?;
    let value = record.field(index);
    let uri = if value.is_zero() {
        descriptor.fields[index].tags.default.map(str::to_string)
    } else {
        value.render()
    };
    Ok(uri.filter(|u| !u.trim().is_empty()))
}

/// Expand and resolve a reference. `None` means there was nothing to fetch.
fn fetch<R: Record>(
    walker: &Walker<'_>,
    record: &R,
    raw: &str,
    tag: Tag,
    path: &str,
) -> Result<Option<Vec<u8>>, FieldError> {
    let scope = RecordScope { record, walker };
    let expanded =
        expr::render(raw, &scope, false).map_err(|e| FieldError::new(path, tag, e))?;
    if expanded.trim().is_empty() {
        trace!(field = %path, %tag, "reference expanded to nothing");
        return Ok(None);
    }

    let uri = normalize_uri(&expanded);
    match walker.resolvers().resolve(walker.context(), &uri) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.is_not_found() => {
            trace!(field = %path, %tag, %uri, "reference not found");
            Ok(None)
        }
        Err(e) => Err(FieldError::new(path, tag, e)),
    }
}
