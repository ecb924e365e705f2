//! Polycodec: one value walker, five wire formats.
//!
//! Values are described once through [`Reflect`] and [`Describe`] (derive
//! both with `#[derive(Codec)]`), then encoded and decoded with any
//! [`Handle`]: Binc, Simple, MessagePack, CBOR or JSON. Handles carry the
//! shared options (canonical maps, struct-as-array, omit-empty, circular
//! reference checks, decode limits) and per-type extensions.
//!
//! # Quick Start
//!
//! ```rust
//! use polycodec::{from_slice, to_vec, Codec, MsgpackHandle};
//!
//! #[derive(Codec, Debug, Default, PartialEq)]
//! struct Person {
//!     name: String,
//!     #[codec(tag = "years,omitempty")]
//!     age: u32,
//! }
//!
//! let h = MsgpackHandle::default();
//! let p = Person { name: "Alice".into(), age: 30 };
//! let bytes = to_vec(&p, &h).unwrap();
//! let back: Person = from_slice(&bytes, &h).unwrap();
//! assert_eq!(p, back);
//! ```

// Lets the derive's `::polycodec` paths resolve inside this crate.
extern crate self as polycodec;

pub mod chan;
pub mod codec;
pub mod error;
pub mod ext;
pub mod format;
pub mod handle;
pub mod reflect;
pub mod rpc;
pub mod types;
pub mod value;

#[cfg(feature = "serde")]
pub mod serde;

use std::panic::{self, AssertUnwindSafe};

pub use chan::Chan;
pub use codec::{decode_into, from_slice, from_value, to_vec, Decoder, Encoder};
pub use error::{ConfigError, DecodeError, EncodeError, Error, ExtError, Result, RpcError};
pub use ext::Extension;
pub use format::{BincHandle, CborHandle, JsonHandle, MsgpackHandle, SimpleHandle};
pub use handle::{BasicHandle, DecodeOptions, EncodeOptions, Handle};
pub use reflect::{Interface, Raw, Reflect, SelfMarshal, SeqTarget};
pub use types::Describe;
pub use value::{RawExt, Value};

/// The trait every walkable type implements.
pub use reflect::Codec;

// Derive macro of the same name, living in the macro namespace.
#[cfg(feature = "derive")]
pub use polycodec_derive::Codec;

/// Run `f`, turning a panic raised by `must_encode`/`must_decode` back into
/// its error. Other panics keep unwinding.
pub fn recover<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| match payload.downcast::<Error>() {
        Ok(err) => *err,
        Err(other) => panic::resume_unwind(other),
    })
}
