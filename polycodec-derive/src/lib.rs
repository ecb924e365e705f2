//! Derive macro for polycodec.
//!
//! `#[derive(Codec)]` implements both `Describe` (the static shape read by
//! the type descriptor cache) and `Reflect` (the dynamic hooks the walker
//! calls) for a struct.
//!
//! # Example
//!
//! ```rust,ignore
//! use polycodec::Codec;
//!
//! #[derive(Codec, Default)]
//! #[codec(toarray)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! #[derive(Codec, Default)]
//! struct Labeled {
//!     #[codec(embed)]
//!     point: Point,
//!     #[codec(tag = "label,omitempty")]
//!     name: String,
//!     #[codec(skip)]
//!     cache: Vec<u8>,
//! }
//! ```

mod attr;
mod describe;
mod reflect;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput, Fields, Generics, Index, Member, Result, Type};

use attr::{FieldAttrs, StructAttrs};

/// Derive `Describe` and `Reflect`.
///
/// # Container attributes
///
/// - `#[codec(tag = ",toarray")]` - Raw struct tag.
/// - `#[codec(toarray)]` - Encode positionally as an array.
/// - `#[codec(omitempty)]` - Omit every empty field.
/// - `#[codec(transparent)]` - Newtype encoded as its only field.
/// - `#[codec(map_by_slice)]` - Newtype over a `Vec` of alternating keys and
///   values, encoded as a map.
/// - `#[codec(self_marshal)]` - Encode through the type's `SelfMarshal`
///   impl. The type must also implement `Default`.
///
/// # Field attributes
///
/// - `#[codec(tag = "name,omitempty")]` - Wire name and options; `"-"` skips.
/// - `#[codec(rename = "name")]` - Same as `tag`.
/// - `#[codec(omitempty)]` - Omit the field when empty.
/// - `#[codec(embed)]` - Promote the member's fields into this struct.
/// - `#[codec(skip)]` - Never encode or decode this field.
#[proc_macro_derive(Codec, attributes(codec))]
pub fn derive_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// A field that takes part in the walk.
pub(crate) struct CodecField {
    pub member: Member,
    /// Declared name: the identifier, or the position for tuple structs.
    pub name: String,
    pub ty: Type,
    pub attrs: FieldAttrs,
    /// Position among non-skipped fields, as `Reflect::field` sees it.
    pub index: usize,
}

fn expand(input: &DeriveInput) -> Result<TokenStream2> {
    let attrs = StructAttrs::from_attrs(&input.attrs)?;
    let fields = collect_fields(input)?;
    let generics = bounded_generics(&input.generics, &fields);

    let describe = describe::impl_describe(input, &generics, &attrs, &fields)?;
    let reflect = reflect::impl_reflect(input, &generics, &attrs, &fields)?;

    Ok(quote! {
        #describe
        #reflect
    })
}

fn collect_fields(input: &DeriveInput) -> Result<Vec<CodecField>> {
    let data = match &input.data {
        Data::Struct(data) => data,
        Data::Enum(e) => {
            return Err(syn::Error::new_spanned(e.enum_token, "Codec can only be derived for structs"));
        }
        Data::Union(u) => {
            return Err(syn::Error::new_spanned(u.union_token, "Codec can only be derived for structs"));
        }
    };

    let mut out = Vec::new();
    let raw: Vec<_> = match &data.fields {
        Fields::Named(named) => named.named.iter().collect(),
        Fields::Unnamed(unnamed) => unnamed.unnamed.iter().collect(),
        Fields::Unit => Vec::new(),
    };
    for (pos, field) in raw.into_iter().enumerate() {
        let attrs = FieldAttrs::from_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let (member, name) = match &field.ident {
            Some(ident) => {
                let name = ident.to_string();
                let name = name.strip_prefix("r#").map(str::to_string).unwrap_or(name);
                (Member::Named(ident.clone()), name)
            }
            None => (Member::Unnamed(Index::from(pos)), pos.to_string()),
        };
        out.push(CodecField {
            member,
            name,
            ty: field.ty.clone(),
            attrs,
            index: out.len(),
        });
    }
    Ok(out)
}

// Generic structs need every walked field type to be a codec type.
fn bounded_generics(generics: &Generics, fields: &[CodecField]) -> Generics {
    let mut generics = generics.clone();
    if generics.type_params().next().is_none() {
        return generics;
    }
    let params: Vec<_> = generics.type_params().map(|p| p.ident.clone()).collect();
    let where_clause = generics.make_where_clause();
    for p in params {
        where_clause.predicates.push(parse_quote!(#p: 'static));
    }
    for f in fields {
        let ty = &f.ty;
        where_clause.predicates.push(parse_quote!(#ty: ::polycodec::Codec));
    }
    generics
}

/// The only walked field of a newtype container.
pub(crate) fn single_field<'f>(input: &DeriveInput, fields: &'f [CodecField], what: &str) -> Result<&'f CodecField> {
    match fields {
        [only] => Ok(only),
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            format!("{} requires exactly one non-skipped field", what),
        )),
    }
}
