//! `#[derive(Record)]` for layerfig.
//!
//! Generates a static field table plus the `Record` and `Scan` impls the
//! resolution engine walks. Use it through the `layerfig` crate, which
//! re-exports the macro next to the trait of the same name.

mod attrs;
mod case;
mod record;

/////////////////////////////////////////////////////////////////////////////////////////

/// Derive `layerfig::Record` for a struct with named fields.
///
/// Field attributes: `#[record(default = "..", env = "..", ref = "..",
/// ref_from = "sibling", dsn = "..", dsn_strict, skip)]`.
/// Container attribute: `#[record(set_defaults)]`.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    match record::record_impl(input) {
        Ok(output) => proc_macro::TokenStream::from(output),
        Err(err) => err.to_compile_error().into(),
    }
}
