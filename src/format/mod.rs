//! The shipped wire formats.
//!
//! Each module pairs a [`crate::Handle`] with its encode and decode drivers.
//! Binary formats share the big-endian helpers in [`crate::codec::wire`].

pub mod binc;
pub mod cbor;
pub mod json;
pub mod msgpack;
pub mod simple;

pub use binc::BincHandle;
pub use cbor::CborHandle;
pub use json::JsonHandle;
pub use msgpack::MsgpackHandle;
pub use simple::SimpleHandle;

/// The `basic`/`basic_mut` pair for handles storing their options in a
/// `basic` field.
macro_rules! basic_accessors {
    () => {
        fn basic(&self) -> &$crate::handle::BasicHandle {
            &self.basic
        }

        fn basic_mut(&mut self) -> &mut $crate::handle::BasicHandle {
            &mut self.basic
        }
    };
}

pub(crate) use basic_accessors;

use crate::error::DecodeError;

pub(crate) fn bad_descriptor(format: &'static str, byte: u8, offset: usize) -> DecodeError {
    DecodeError::InvalidDescriptor {
        format,
        byte,
        offset,
    }
}

/// Peek the next byte, failing at end of input.
pub(crate) fn peek_required(r: &mut dyn crate::codec::DecReader) -> Result<u8, DecodeError> {
    r.peek_byte()?
        .ok_or(DecodeError::UnexpectedEof {
            offset: r.num_read(),
        })
}
