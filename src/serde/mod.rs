//! Serde integration.
//!
//! Types implementing `Serialize`/`Deserialize` are bridged through the
//! dynamic [`Value`] tree, so they can travel through any [`Handle`] without
//! deriving `Codec`.
//!
//! # Example
//!
//! ```rust
//! use polycodec::{CborHandle, serde as pserde};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: i64,
//! }
//!
//! let h = CborHandle::default();
//! let person = Person { name: "Alice".into(), age: 30 };
//!
//! let bytes = pserde::to_vec(&person, &h).unwrap();
//! let decoded: Person = pserde::from_slice(&bytes, &h).unwrap();
//! assert_eq!(person, decoded);
//! ```

mod de;
mod error;
mod ser;

pub use de::ValueDeserializer;
pub use error::SerdeError;
pub use ser::ValueSerializer;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::handle::Handle;
use crate::value::Value;

/// Serialize a value and encode it with `handle`.
pub fn to_vec<T: Serialize + ?Sized>(value: &T, handle: &dyn Handle) -> Result<Vec<u8>, SerdeError> {
    let v = to_value(value)?;
    Ok(codec::to_vec(&v, handle)?)
}

/// Decode `data` with `handle` and deserialize the result.
pub fn from_slice<T: DeserializeOwned>(data: &[u8], handle: &dyn Handle) -> Result<T, SerdeError> {
    let v: Value = codec::from_slice(data, handle)?;
    from_value(v)
}

/// Serialize a value to a [`Value`] without encoding it.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, SerdeError> {
    ValueSerializer::serialize(value)
}

/// Deserialize a Rust type out of a [`Value`].
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, SerdeError> {
    T::deserialize(ValueDeserializer::new(value))
}
