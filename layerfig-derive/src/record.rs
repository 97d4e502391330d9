use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::ext::IdentExt;
use syn::spanned::Spanned;

use crate::attrs::{ContainerOpts, FieldOpts, SerdeFieldOpts, SerdeTypeOpts};

/////////////////////////////////////////////////////////////////////////////////////////

struct WalkedField {
    ident: syn::Ident,
    ty: syn::Type,
    name: String,
    key: String,
    opts: FieldOpts,
}

pub(crate) fn record_impl(input: syn::DeriveInput) -> syn::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "`Record` cannot be derived for generic structs",
        ));
    }

    let fields = match input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(fields),
            ..
        }) => fields.named,
        syn::Data::Struct(data) => {
            return Err(syn::Error::new(
                data.struct_token.span,
                "`Record` requires a struct with named fields",
            ));
        }
        syn::Data::Enum(data) => {
            return Err(syn::Error::new(
                data.enum_token.span,
                "`Record` can only be derived for structs",
            ));
        }
        syn::Data::Union(data) => {
            return Err(syn::Error::new(
                data.union_token.span,
                "`Record` can only be derived for structs",
            ));
        }
    };

    let container = ContainerOpts::parse(&input.attrs)?;
    let serde_type = SerdeTypeOpts::parse(&input.attrs)?;

    let mut walked = Vec::new();
    for field in fields {
        let opts = FieldOpts::parse(&field.attrs)?;
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        if opts.skip {
            continue;
        }
        if matches!(field.vis, syn::Visibility::Inherited) {
            if opts.has_tags() {
                return Err(syn::Error::new(
                    opts.span.unwrap_or_else(|| ident.span()),
                    "private fields are not resolved; make the field `pub` or mark it `skip`",
                ));
            }
            continue;
        }

        let name = ident.unraw().to_string();
        let serde_field = SerdeFieldOpts::parse(&field.attrs)?;
        let key = match (serde_field.rename, serde_type.rename_all) {
            (Some(rename), _) => rename,
            (None, Some(rule)) => rule.apply(&name),
            (None, None) => name.clone(),
        };

        walked.push(WalkedField {
            ident,
            ty: field.ty,
            name,
            key,
            opts,
        });
    }

    check_siblings(&walked)?;

    let ty = &input.ident;
    let type_name = ty.unraw().to_string();
    let count = walked.len();

    let descriptors = walked.iter().map(field_descriptor);
    let indices: Vec<_> = (0..count).collect();
    let idents: Vec<_> = walked.iter().map(|f| &f.ident).collect();

    let finalize = container.set_defaults.then(|| {
        quote! {
            fn finalize(&mut self) -> ::core::result::Result<(), ::layerfig::BoxError> {
                ::layerfig::SetDefaults::set_defaults(self)
            }
        }
    });

    Ok(quote! {
        const _: () = {
            static FIELDS: [::layerfig::meta::FieldDescriptor; #count] = [#(#descriptors),*];

            static DESCRIPTOR: ::layerfig::meta::RecordDescriptor = ::layerfig::meta::RecordDescriptor {
                type_name: #type_name,
                fields: &FIELDS,
            };

            #[automatically_derived]
            impl ::layerfig::Record for #ty {
                fn descriptor() -> &'static ::layerfig::meta::RecordDescriptor {
                    &DESCRIPTOR
                }

                fn field(&self, index: usize) -> &dyn ::layerfig::Scan {
                    match index {
                        #(#indices => &self.#idents,)*
                        _ => ::core::panic!("{} has no field #{}", #type_name, index),
                    }
                }

                fn field_mut(&mut self, index: usize) -> &mut dyn ::layerfig::Scan {
                    match index {
                        #(#indices => &mut self.#idents,)*
                        _ => ::core::panic!("{} has no field #{}", #type_name, index),
                    }
                }

                #finalize
            }

            #[automatically_derived]
            impl ::layerfig::Scan for #ty {
                fn shape() -> ::layerfig::meta::Shape {
                    ::layerfig::meta::Shape::Record(<Self as ::layerfig::Record>::descriptor)
                }

                fn is_zero(&self) -> bool {
                    true #(&& ::layerfig::Scan::is_zero(&self.#idents))*
                }

                fn scan(&mut self, _raw: &[u8]) -> ::core::result::Result<(), ::layerfig::ConvertError> {
                    ::core::result::Result::Err(::layerfig::ConvertError::Unsupported {
                        type_name: ::core::any::type_name::<Self>(),
                    })
                }

                fn render_path(&self, path: &[&str]) -> ::core::option::Option<::std::string::String> {
                    ::layerfig::record::render_record_path(self, path)
                }

                fn walk(
                    &mut self,
                    walker: &mut ::layerfig::walk::Walker<'_>,
                ) -> ::core::result::Result<(), ::layerfig::LayerfigError> {
                    walker.walk_record(self)
                }
            }
        };
    })
}

/// `ref_from` must name another walked field.
fn check_siblings(fields: &[WalkedField]) -> syn::Result<()> {
    for field in fields {
        let Some((sibling, span)) = &field.opts.reference_from else {
            continue;
        };
        if sibling == &field.name {
            return Err(syn::Error::new(*span, "`ref_from` cannot name the field itself"));
        }
        let known = fields
            .iter()
            .any(|f| &f.name == sibling || &f.key == sibling);
        if !known {
            return Err(syn::Error::new(
                *span,
                format!("`ref_from` names unknown field `{sibling}`"),
            ));
        }
    }
    Ok(())
}

fn field_descriptor(field: &WalkedField) -> TokenStream {
    let name = &field.name;
    let key = &field.key;
    let ty = &field.ty;
    let opts = &field.opts;

    let default = optional(opts.default.as_deref());
    let env = optional(opts.env.as_deref());
    let reference = optional(opts.reference.as_deref());
    let reference_from = optional(opts.reference_from.as_ref().map(|(s, _)| s.as_str()));
    let dsn = optional(opts.dsn.as_deref());
    let dsn_strict = opts.dsn_strict;

    quote! {
        ::layerfig::meta::FieldDescriptor {
            name: #name,
            key: #key,
            tags: ::layerfig::meta::Tags {
                default: #default,
                env: #env,
                reference: #reference,
                reference_from: #reference_from,
                dsn: #dsn,
                dsn_strict: #dsn_strict,
            },
            shape: <#ty as ::layerfig::Scan>::shape,
        }
    }
}

fn optional(value: Option<&str>) -> TokenStream {
    match value {
        Some(s) => {
            let lit = syn::LitStr::new(s, Span::call_site());
            quote!(::core::option::Option::Some(#lit))
        }
        None => quote!(::core::option::Option::None),
    }
}
