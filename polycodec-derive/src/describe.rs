//! `Describe` generation: the static shape of the container.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, GenericArgument, Generics, PathArguments, Result, Type};

use crate::attr::{Mode, StructAttrs};
use crate::{single_field, CodecField};

pub fn impl_describe(
    input: &DeriveInput,
    generics: &Generics,
    attrs: &StructAttrs,
    fields: &[CodecField],
) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let shape = match attrs.mode {
        Mode::Struct => {
            let name_str = name.to_string();
            let tag = opt_str(attrs.runtime_tag());
            let omit_all = attrs.omit_all();
            let decls = fields.iter().map(|f| {
                let ident = &f.name;
                let index = f.index;
                let tag = opt_str(f.attrs.tag.clone());
                let omit = f.attrs.omit_empty;
                let embed = f.attrs.embed;
                let ty = &f.ty;
                quote! {
                    ::polycodec::types::FieldDecl {
                        ident: #ident,
                        index: #index,
                        tag: #tag,
                        omit_empty: #omit,
                        embed: #embed,
                        ty: ::polycodec::types::TypeRef::of::<#ty>(),
                    }
                }
            });
            quote! {
                ::polycodec::types::Shape::Struct(::polycodec::types::StructShape {
                    name: #name_str,
                    tag: #tag,
                    omit_empty: #omit_all,
                    fields: ::std::vec![#(#decls),*],
                })
            }
        }
        Mode::Transparent => {
            let ty = &single_field(input, fields, "transparent")?.ty;
            quote! { <#ty as ::polycodec::Describe>::shape() }
        }
        Mode::MapBySlice => {
            let field = single_field(input, fields, "map_by_slice")?;
            let elem = vec_elem(&field.ty)?;
            quote! {
                ::polycodec::types::Shape::MapBySlice(::polycodec::types::TypeRef::of::<#elem>())
            }
        }
        Mode::SelfMarshal => quote! { ::polycodec::types::Shape::SelfMarshal },
    };

    Ok(quote! {
        impl #impl_generics ::polycodec::Describe for #name #ty_generics #where_clause {
            fn shape() -> ::polycodec::types::Shape {
                #shape
            }
        }
    })
}

fn opt_str(s: Option<String>) -> TokenStream {
    match s {
        Some(s) => quote! { ::std::option::Option::Some(#s) },
        None => quote! { ::std::option::Option::None },
    }
}

/// `T` out of `Vec<T>`.
fn vec_elem(ty: &Type) -> Result<&Type> {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            if seg.ident == "Vec" {
                if let PathArguments::AngleBracketed(args) = &seg.arguments {
                    if let Some(GenericArgument::Type(elem)) = args.args.first() {
                        return Ok(elem);
                    }
                }
            }
        }
    }
    Err(syn::Error::new_spanned(ty, "map_by_slice requires a Vec<T> field"))
}
