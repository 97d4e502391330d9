use proc_macro2::Span;
use quote::ToTokens;
use syn::spanned::Spanned;

use crate::case::RenameRule;

/////////////////////////////////////////////////////////////////////////////////////////

/// Options from `#[record(...)]` on a field.
#[derive(Default)]
pub(crate) struct FieldOpts {
    pub default: Option<String>,
    pub env: Option<String>,
    pub reference: Option<String>,
    pub reference_from: Option<(String, Span)>,
    pub dsn: Option<String>,
    pub dsn_strict: bool,
    pub skip: bool,
    /// Span of the first `#[record]` attribute, if any.
    pub span: Option<Span>,
}

impl FieldOpts {
    pub fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut opts = Self::default();

        for attr in attrs.iter() {
            if attr.path().is_ident("record") {
                opts.span.get_or_insert(attr.span());
                opts.parse_from(attr)?;
            }
        }

        if opts.dsn_strict && opts.dsn.is_none() {
            return Err(syn::Error::new(
                opts.span.unwrap_or_else(Span::call_site),
                "`dsn_strict` requires `dsn`",
            ));
        }

        Ok(opts)
    }

    fn parse_from(&mut self, attr: &syn::Attribute) -> syn::Result<()> {
        attr.parse_nested_meta(|meta| {
            let span = meta.path.span();
            if meta.path.is_ident("default") {
                let lit: syn::Lit = meta.value()?.parse()?;
                set_once(&mut self.default, literal_text(&lit)?, "default", span)
            } else if meta.path.is_ident("env") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                let name = lit.value();
                if name.trim().is_empty() {
                    return Err(syn::Error::new(lit.span(), "`env` needs a variable name"));
                }
                set_once(&mut self.env, name, "env", span)
            } else if meta.path.is_ident("ref") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                set_once(&mut self.reference, lit.value(), "ref", span)
            } else if meta.path.is_ident("ref_from") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                set_once(
                    &mut self.reference_from,
                    (lit.value(), lit.span()),
                    "ref_from",
                    span,
                )
            } else if meta.path.is_ident("dsn") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                set_once(&mut self.dsn, lit.value(), "dsn", span)
            } else if meta.path.is_ident("dsn_strict") {
                self.dsn_strict = flag(&meta)?;
                Ok(())
            } else if meta.path.is_ident("skip") {
                self.skip = flag(&meta)?;
                Ok(())
            } else {
                Err(syn::Error::new(
                    span,
                    format!("unknown record option `{}`", meta.path.to_token_stream()),
                ))
            }
        })
    }

    pub fn has_tags(&self) -> bool {
        self.default.is_some()
            || self.env.is_some()
            || self.reference.is_some()
            || self.reference_from.is_some()
            || self.dsn.is_some()
    }
}

/////////////////////////////////////////////////////////////////////////////////////////

/// Options from `#[record(...)]` on the struct itself.
#[derive(Default)]
pub(crate) struct ContainerOpts {
    pub set_defaults: bool,
}

impl ContainerOpts {
    pub fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut opts = Self::default();

        for attr in attrs.iter() {
            if attr.path().is_ident("record") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("set_defaults") {
                        opts.set_defaults = flag(&meta)?;
                        Ok(())
                    } else {
                        Err(syn::Error::new(
                            meta.path.span(),
                            format!(
                                "unknown record container option `{}`",
                                meta.path.to_token_stream()
                            ),
                        ))
                    }
                })?;
            }
        }

        Ok(opts)
    }
}

/////////////////////////////////////////////////////////////////////////////////////////

/// The serde options that change a field's document key.
pub(crate) struct SerdeTypeOpts {
    pub rename_all: Option<RenameRule>,
}

impl SerdeTypeOpts {
    pub fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut opts = Self { rename_all: None };

        for attr in attrs.iter() {
            if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename_all") {
                        if let Some(name) = deserialize_name(&meta)? {
                            opts.rename_all = Some(RenameRule::parse(&name, meta.path.span())?);
                        }
                        Ok(())
                    } else {
                        skip_serde_option(&meta)
                    }
                })?;
            }
        }

        Ok(opts)
    }
}

pub(crate) struct SerdeFieldOpts {
    pub rename: Option<String>,
}

impl SerdeFieldOpts {
    pub fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut opts = Self { rename: None };

        for attr in attrs.iter() {
            if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        if let Some(name) = deserialize_name(&meta)? {
                            opts.rename = Some(name);
                        }
                        Ok(())
                    } else {
                        skip_serde_option(&meta)
                    }
                })?;
            }
        }

        Ok(opts)
    }
}

/////////////////////////////////////////////////////////////////////////////////////////

/// `rename = "x"` or `rename(deserialize = "x")`; the serialize-only form
/// yields `None`.
fn deserialize_name(meta: &syn::meta::ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(syn::Token![=]) {
        let lit: syn::LitStr = meta.value()?.parse()?;
        return Ok(Some(lit.value()));
    }

    let mut name = None;
    meta.parse_nested_meta(|inner| {
        let lit: syn::LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("deserialize") {
            name = Some(lit.value());
        }
        Ok(())
    })?;
    Ok(name)
}

fn skip_serde_option(meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _ = meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _ = content.parse::<proc_macro2::TokenStream>()?;
    }
    Ok(())
}

/// A bare flag, or `flag = true` / `flag = false`.
fn flag(meta: &syn::meta::ParseNestedMeta) -> syn::Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        let lit: syn::LitBool = meta.value()?.parse()?;
        Ok(lit.value)
    } else {
        Ok(true)
    }
}

/// Defaults are stored as the text the converter will parse.
fn literal_text(lit: &syn::Lit) -> syn::Result<String> {
    match lit {
        syn::Lit::Str(s) => Ok(s.value()),
        syn::Lit::Int(i) => Ok(i.base10_digits().to_string()),
        syn::Lit::Float(f) => Ok(f.base10_digits().to_string()),
        syn::Lit::Bool(b) => Ok(b.value.to_string()),
        other => Err(syn::Error::new(
            other.span(),
            "`default` must be a string, number or bool literal",
        )),
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &str, span: Span) -> syn::Result<()> {
    if slot.is_some() {
        return Err(syn::Error::new(
            span,
            format!("`{name}` specified more than once"),
        ));
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(tokens: proc_macro2::TokenStream) -> syn::Field {
        let input: syn::DeriveInput = syn::parse_quote!(struct S { #tokens });
        match input.data {
            syn::Data::Struct(data) => data.fields.into_iter().next().unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_all_tags() {
        let field = field(quote::quote! {
            #[record(default = 5432, env = "DB_PORT")]
            #[record(ref = "file:///run/port", ref_from = "port_uri")]
            pub port: u16
        });
        let opts = FieldOpts::parse(&field.attrs).unwrap();
        assert_eq!(opts.default.as_deref(), Some("5432"));
        assert_eq!(opts.env.as_deref(), Some("DB_PORT"));
        assert_eq!(opts.reference.as_deref(), Some("file:///run/port"));
        assert_eq!(opts.reference_from.map(|(n, _)| n).as_deref(), Some("port_uri"));
        assert!(!opts.dsn_strict);
    }

    #[test]
    fn bool_and_float_defaults_become_text() {
        let a = field(quote::quote! { #[record(default = true)] pub a: bool });
        let b = field(quote::quote! { #[record(default = 0.5)] pub b: f64 });
        assert_eq!(FieldOpts::parse(&a.attrs).unwrap().default.as_deref(), Some("true"));
        assert_eq!(FieldOpts::parse(&b.attrs).unwrap().default.as_deref(), Some("0.5"));
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let field = field(quote::quote! {
            #[record(env = "A")]
            #[record(env = "B")]
            pub a: String
        });
        let err = FieldOpts::parse(&field.attrs).err().unwrap();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn dsn_strict_needs_dsn() {
        let field = field(quote::quote! { #[record(dsn_strict)] pub a: String });
        assert!(FieldOpts::parse(&field.attrs).is_err());
    }

    #[test]
    fn serde_rename_forms() {
        let plain = field(quote::quote! { #[serde(rename = "svc", default)] pub a: String });
        let split = field(quote::quote! {
            #[serde(rename(serialize = "out", deserialize = "in"))]
            pub a: String
        });
        assert_eq!(SerdeFieldOpts::parse(&plain.attrs).unwrap().rename.as_deref(), Some("svc"));
        assert_eq!(SerdeFieldOpts::parse(&split.attrs).unwrap().rename.as_deref(), Some("in"));
    }

    #[test]
    fn unrelated_serde_options_are_skipped() {
        let input: syn::DeriveInput = syn::parse_quote! {
            #[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
            struct A { pub a: String }
        };
        let opts = SerdeTypeOpts::parse(&input.attrs).unwrap();
        assert_eq!(opts.rename_all, Some(RenameRule::Kebab));
    }
}
