//! The value walker's view of Rust types.
//!
//! [`Reflect`] is the object-safe half: each type exposes its shape by
//! calling back into the walker helpers on [`Encoder`] and [`Decoder`],
//! which own the traversal policy (extensions, raw mode, omit-empty,
//! canonical ordering, circular references). [`Describe`] is the static
//! half feeding the type descriptor cache. `#[derive(Codec)]` implements
//! both for structs.

mod dynamic;
mod impls;
mod interface;

use std::any::Any;

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, EncodeError, ExtError};
use crate::types::Describe;

pub use interface::Interface;

/// A value the walker can encode and decode in place.
pub trait Reflect: Any {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError>;

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError>;

    /// Zero value test used by omit-empty.
    fn is_empty_value(&self) -> bool;

    /// Reset to the zero value (decoding a null).
    fn reset_zero(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Struct field by declaration index (skipped fields excluded).
    fn field(&self, _index: usize) -> Option<&dyn Reflect> {
        None
    }

    fn field_mut(&mut self, _index: usize) -> Option<&mut dyn Reflect> {
        None
    }

    /// Target of a pointer-like value; `None` when null.
    fn pointee(&self) -> Option<&dyn Reflect> {
        None
    }

    /// Mutable target of a pointer-like value, allocating when null.
    fn pointee_mut(&mut self) -> Option<&mut dyn Reflect> {
        None
    }
}

/// Everything the walker needs: dynamic hooks plus a static shape.
pub trait Codec: Reflect + Describe {}

impl<T: Reflect + Describe> Codec for T {}

/// Destination of a sequence decode.
pub trait SeqTarget {
    /// Prepare for a new sequence, reserving at most `reserve` elements.
    fn begin(&mut self, reserve: usize);

    fn decode_elem(&mut self, index: usize, d: &mut Decoder<'_>) -> Result<(), DecodeError>;

    /// Called once after the last element.
    fn finish(&mut self, _count: usize) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Self-describing serialization hooks.
///
/// Return `None` from a form the type does not support. Binary formats try
/// binary then text; text formats try JSON, then text, then binary.
pub trait SelfMarshal {
    fn marshal_binary(&self) -> Option<Result<Vec<u8>, ExtError>> {
        None
    }

    fn unmarshal_binary(&mut self, _data: &[u8]) -> Option<Result<(), ExtError>> {
        None
    }

    fn marshal_text(&self) -> Option<Result<String, ExtError>> {
        None
    }

    fn unmarshal_text(&mut self, _text: &str) -> Option<Result<(), ExtError>> {
        None
    }

    fn marshal_json(&self) -> Option<Result<Vec<u8>, ExtError>> {
        None
    }

    fn unmarshal_json(&mut self, _json: &[u8]) -> Option<Result<(), ExtError>> {
        None
    }
}

/// Pre-encoded bytes, passed through verbatim when the handle is in raw
/// mode and treated as a byte string otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Raw(pub Vec<u8>);

impl Raw {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Raw {
    fn from(v: Vec<u8>) -> Self {
        Raw(v)
    }
}

/// Expands to the `as_any` pair every `Reflect` impl carries.
#[macro_export]
macro_rules! reflect_any {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
