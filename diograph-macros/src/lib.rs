//! Proc macros for diograph field schemas.
//!
//! Provides `#[derive(FieldSchema)]`, which turns a struct of optional fields
//! into the fixed, compile-time list of fields an entity kind recognises,
//! together with typed setters and getters keyed by document field name.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, PartialEq, FieldSchema)]
//! pub struct RoomFields {
//!     /// Free text describing the room
//!     pub text: Option<String>,
//!     /// Stored under a different name in documents
//!     #[field(rename = "geo")]
//!     pub latlng: Option<String>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, Meta, Type};

/// Derive macro for generating `FieldSchema` implementations.
///
/// Every field must be an `Option<T>` where `T` is serde-serializable.
/// `None` means "absent"; assigning JSON `null` clears the field.
///
/// # Attributes
///
/// - `#[field(rename = "...")]` on fields - Override the document field name
/// - `#[field(skip)]` on fields - Leave the field out of the schema
#[proc_macro_derive(FieldSchema, attributes(field))]
pub fn derive_field_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_field_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_field_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "FieldSchema derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "FieldSchema derive only supports structs",
            ))
        }
    };

    let mut names = Vec::new();
    let mut idents = Vec::new();

    for field in fields {
        if is_field_skipped(field)? {
            continue;
        }
        if !is_option_type(&field.ty) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "FieldSchema fields must be Option<T>",
            ));
        }
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        names.push(get_field_name(field)?);
        idents.push(ident);
    }

    Ok(quote! {
        impl #impl_generics ::diograph_core::schema::FieldSchema for #struct_name #ty_generics #where_clause {
            const FIELDS: &'static [&'static str] = &[#(#names),*];

            fn assign(
                &mut self,
                field: &str,
                value: ::diograph_core::schema::Value,
            ) -> ::std::result::Result<(), ::diograph_core::schema::FieldRejection> {
                match field {
                    #(
                        #names => {
                            self.#idents = ::diograph_core::schema::decode_field(field, value)?;
                            ::std::result::Result::Ok(())
                        }
                    )*
                    _ => ::std::result::Result::Err(
                        ::diograph_core::schema::FieldRejection::Unknown {
                            field: field.to_string(),
                        },
                    ),
                }
            }

            fn value_of(
                &self,
                field: &str,
            ) -> ::std::option::Option<::diograph_core::schema::Value> {
                match field {
                    #( #names => ::diograph_core::schema::encode_field(&self.#idents), )*
                    _ => ::std::option::Option::None,
                }
            }
        }
    })
}

fn field_attr_meta(field: &Field) -> syn::Result<Vec<Meta>> {
    let mut metas = Vec::new();
    for attr in &field.attrs {
        if attr.path().is_ident("field") {
            metas.push(attr.parse_args::<Meta>()?);
        }
    }
    Ok(metas)
}

fn get_field_name(field: &Field) -> syn::Result<String> {
    for meta in field_attr_meta(field)? {
        if let Meta::NameValue(nv) = meta {
            if nv.path.is_ident("rename") {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        return Ok(s.value());
                    }
                }
                return Err(syn::Error::new_spanned(nv, "rename expects a string literal"));
            }
        }
    }

    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string())
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn is_field_skipped(field: &Field) -> syn::Result<bool> {
    for meta in field_attr_meta(field)? {
        if let Meta::Path(path) = meta {
            if path.is_ident("skip") {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}
