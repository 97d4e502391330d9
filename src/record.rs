//! The [`Record`] trait implemented by `#[derive(Record)]`.

use crate::convert::BoxError;
use crate::meta::RecordDescriptor;
use crate::value::Scan;

/// A struct whose fields the walker can visit by index.
///
/// Indices follow [`RecordDescriptor::fields`]: field `i` of the descriptor
/// is reached through `field(i)` / `field_mut(i)`. Implementations panic on
/// an out-of-range index, which the walker never produces.
pub trait Record: Scan {
    fn descriptor() -> &'static RecordDescriptor
    where
        Self: Sized;

    fn field(&self, index: usize) -> &dyn Scan;

    fn field_mut(&mut self, index: usize) -> &mut dyn Scan;

    /// Post-order hook, run once after every field of this struct has been
    /// resolved. The derive forwards it to [`SetDefaults`] when the struct
    /// is annotated `#[record(set_defaults)]`.
    fn finalize(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Fill computed defaults that depend on already-resolved siblings.
pub trait SetDefaults {
    fn set_defaults(&mut self) -> Result<(), BoxError>;
}

/// Follow a dotted path into a record: the first segment names a field (by
/// Rust name or document key), the rest is handed to that field.
pub fn render_record_path<R: Record>(record: &R, path: &[&str]) -> Option<String> {
    let (name, rest) = path.split_first()?;
    let index = R::descriptor().position(name)?;
    record.field(index).render_path(rest)
}
