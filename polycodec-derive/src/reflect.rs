//! `Reflect` generation: the walker hooks.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Generics, Result};

use crate::attr::{Mode, StructAttrs};
use crate::{single_field, CodecField};

pub fn impl_reflect(
    input: &DeriveInput,
    generics: &Generics,
    attrs: &StructAttrs,
    fields: &[CodecField],
) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match attrs.mode {
        Mode::Struct => struct_body(fields),
        Mode::Transparent => {
            let m = &single_field(input, fields, "transparent")?.member;
            quote! {
                fn encode_with(&self, e: &mut ::polycodec::Encoder<'_>) -> ::std::result::Result<(), ::polycodec::EncodeError> {
                    e.encode_value(&self.#m)
                }

                fn decode_with(&mut self, d: &mut ::polycodec::Decoder<'_>) -> ::std::result::Result<(), ::polycodec::DecodeError> {
                    d.decode_value(&mut self.#m)
                }

                fn is_empty_value(&self) -> bool {
                    ::polycodec::Reflect::is_empty_value(&self.#m)
                }

                fn reset_zero(&mut self) {
                    ::polycodec::Reflect::reset_zero(&mut self.#m)
                }
            }
        }
        Mode::MapBySlice => {
            let m = &single_field(input, fields, "map_by_slice")?.member;
            quote! {
                fn encode_with(&self, e: &mut ::polycodec::Encoder<'_>) -> ::std::result::Result<(), ::polycodec::EncodeError> {
                    e.encode_map_by_slice(
                        ::std::any::type_name::<Self>(),
                        self.#m.len(),
                        self.#m.iter().map(|x| x as &dyn ::polycodec::Reflect),
                    )
                }

                fn decode_with(&mut self, d: &mut ::polycodec::Decoder<'_>) -> ::std::result::Result<(), ::polycodec::DecodeError> {
                    d.decode_map_by_slice(&mut self.#m)
                }

                fn is_empty_value(&self) -> bool {
                    self.#m.is_empty()
                }

                fn reset_zero(&mut self) {
                    self.#m.clear()
                }
            }
        }
        Mode::SelfMarshal => quote! {
            fn encode_with(&self, e: &mut ::polycodec::Encoder<'_>) -> ::std::result::Result<(), ::polycodec::EncodeError> {
                e.encode_self_marshal(self, ::std::any::type_name::<Self>())
            }

            fn decode_with(&mut self, d: &mut ::polycodec::Decoder<'_>) -> ::std::result::Result<(), ::polycodec::DecodeError> {
                d.decode_self_marshal(self, ::std::any::type_name::<Self>())
            }

            fn is_empty_value(&self) -> bool {
                false
            }

            fn reset_zero(&mut self) {
                *self = ::std::default::Default::default();
            }
        },
    };

    Ok(quote! {
        impl #impl_generics ::polycodec::Reflect for #name #ty_generics #where_clause {
            #body

            ::polycodec::reflect_any!();
        }
    })
}

fn struct_body(fields: &[CodecField]) -> TokenStream {
    let members: Vec<_> = fields.iter().map(|f| &f.member).collect();
    let indices: Vec<_> = fields.iter().map(|f| f.index).collect();

    quote! {
        fn encode_with(&self, e: &mut ::polycodec::Encoder<'_>) -> ::std::result::Result<(), ::polycodec::EncodeError> {
            let ti = ::polycodec::types::type_info::<Self>();
            e.encode_struct(self, &ti)
        }

        fn decode_with(&mut self, d: &mut ::polycodec::Decoder<'_>) -> ::std::result::Result<(), ::polycodec::DecodeError> {
            let ti = ::polycodec::types::type_info::<Self>();
            d.decode_struct(self, &ti)
        }

        fn is_empty_value(&self) -> bool {
            true #(&& ::polycodec::Reflect::is_empty_value(&self.#members))*
        }

        fn reset_zero(&mut self) {
            #(::polycodec::Reflect::reset_zero(&mut self.#members);)*
        }

        fn field(&self, index: usize) -> ::std::option::Option<&dyn ::polycodec::Reflect> {
            match index {
                #(#indices => ::std::option::Option::Some(&self.#members),)*
                _ => ::std::option::Option::None,
            }
        }

        fn field_mut(&mut self, index: usize) -> ::std::option::Option<&mut dyn ::polycodec::Reflect> {
            match index {
                #(#indices => ::std::option::Option::Some(&mut self.#members),)*
                _ => ::std::option::Option::None,
            }
        }
    }
}
