//! Encoder/decoder sessions and the driver contract every wire format fills.
//!
//! A format plugs in through [`EncDriver`] and [`DecDriver`]: primitive
//! reads and writes plus container hooks. The sessions in [`encoder`] and
//! [`decoder`] own the walk; drivers never recurse into values themselves.

pub mod decoder;
pub mod encoder;
pub mod reader;
pub mod value_driver;
pub mod wire;

use std::fmt;

use crate::error::{DecodeError, EncodeError};
use crate::handle::Handle;
use crate::reflect::Reflect;
use crate::value::Value;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use reader::DecReader;

/// How a format carries extension values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtMode {
    /// Tag plus opaque bytes (Binc, Simple, MessagePack).
    Bytes,
    /// Tag header followed by an ordinary value (CBOR).
    Tagged,
    /// No ext marker; the converted value is written as is (JSON).
    Value,
}

/// Kind of the next value in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Nil,
    Bool,
    Int,
    Uint,
    Float,
    Str,
    Bytes,
    Array,
    Map,
    Ext,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Uint => "uint",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
            ValueKind::Ext => "ext",
        };
        f.write_str(s)
    }
}

/// A number as read from the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(v) => Value::Int(v),
            Number::Uint(v) => Value::Uint(v),
            Number::Float(v) => Value::Float(v),
        }
    }
}

/// Write side of a wire format. All output goes to the session's buffer.
pub trait EncDriver {
    fn encode_nil(&mut self, w: &mut Vec<u8>);
    fn encode_bool(&mut self, w: &mut Vec<u8>, v: bool);
    fn encode_int(&mut self, w: &mut Vec<u8>, v: i64);
    fn encode_uint(&mut self, w: &mut Vec<u8>, v: u64);
    fn encode_f32(&mut self, w: &mut Vec<u8>, v: f32);
    fn encode_f64(&mut self, w: &mut Vec<u8>, v: f64);
    fn encode_str(&mut self, w: &mut Vec<u8>, v: &str);
    fn encode_bytes(&mut self, w: &mut Vec<u8>, v: &[u8]);

    fn ext_mode(&self) -> ExtMode;

    /// `ExtMode::Bytes` formats: write tag and payload.
    fn encode_ext_bytes(&mut self, _w: &mut Vec<u8>, tag: u64, _data: &[u8]) -> Result<(), EncodeError> {
        Err(EncodeError::Other(format!("ext bytes for tag {} not supported", tag)))
    }

    /// `ExtMode::Tagged` formats: write the tag header only.
    fn encode_ext_tag(&mut self, _w: &mut Vec<u8>, tag: u64) -> Result<(), EncodeError> {
        Err(EncodeError::Other(format!("ext tag {} not supported", tag)))
    }

    fn write_array_start(&mut self, w: &mut Vec<u8>, len: usize);
    fn write_array_elem(&mut self, _w: &mut Vec<u8>, _first: bool) {}
    fn write_array_end(&mut self, _w: &mut Vec<u8>) {}
    fn write_map_start(&mut self, w: &mut Vec<u8>, len: usize);
    fn write_map_elem_key(&mut self, _w: &mut Vec<u8>, _first: bool) {}
    fn write_map_elem_value(&mut self, _w: &mut Vec<u8>) {}
    fn write_map_end(&mut self, _w: &mut Vec<u8>) {}

    /// Drop per-stream state before a reset.
    fn reset(&mut self) {}
}

/// Read side of a wire format.
///
/// Container reads return `Some(len)` for definite lengths and `None` when
/// the end is marked in-stream; then `check_break` is polled before each
/// element.
pub trait DecDriver {
    fn format(&self) -> &'static str;

    /// Skip whitespace or padding before a value.
    fn skip_insignificant(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        Ok(())
    }

    fn next_kind(&mut self, r: &mut dyn DecReader) -> Result<ValueKind, DecodeError>;

    /// Consume a null if one is next.
    fn try_nil(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError>;

    fn decode_bool(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError>;
    fn decode_number(&mut self, r: &mut dyn DecReader) -> Result<Number, DecodeError>;

    /// Payload of the next string or byte string, uninterpreted.
    fn decode_raw_str(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError>;

    /// Read a string; byte strings are accepted when valid UTF-8.
    fn decode_text(&mut self, r: &mut dyn DecReader) -> Result<String, DecodeError> {
        Ok(String::from_utf8(self.decode_raw_str(r)?)?)
    }

    /// Read a byte string; strings are accepted as their bytes.
    fn decode_bytes(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        self.decode_raw_str(r)
    }

    fn ext_mode(&self) -> ExtMode;

    fn decode_ext_bytes(&mut self, _r: &mut dyn DecReader) -> Result<(u64, Vec<u8>), DecodeError> {
        Err(DecodeError::mismatch("ext", "a format without ext payloads"))
    }

    fn decode_ext_tag(&mut self, _r: &mut dyn DecReader) -> Result<u64, DecodeError> {
        Err(DecodeError::mismatch("ext", "a format without ext tags"))
    }

    fn read_array_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError>;
    fn read_array_elem(&mut self, _r: &mut dyn DecReader, _index: usize) -> Result<(), DecodeError> {
        Ok(())
    }
    fn read_array_end(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        Ok(())
    }
    fn read_map_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError>;
    fn read_map_elem_key(&mut self, _r: &mut dyn DecReader, _index: usize) -> Result<(), DecodeError> {
        Ok(())
    }
    fn read_map_elem_value(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        Ok(())
    }
    fn read_map_end(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        Ok(())
    }

    /// True (and consumed, where the format has a marker) at the end of an
    /// indefinite container.
    fn check_break(&mut self, _r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        Ok(false)
    }

    /// Skip one complete value, nested at most `depth_left` containers deep.
    /// A tag wrapping a value counts as one level.
    fn swallow(&mut self, r: &mut dyn DecReader, depth_left: usize) -> Result<(), DecodeError> {
        let kind = self.next_kind(r)?;
        let nests = match kind {
            ValueKind::Array | ValueKind::Map => true,
            ValueKind::Ext => self.ext_mode() == ExtMode::Tagged,
            _ => false,
        };
        if nests && depth_left == 0 {
            return Err(DecodeError::DepthExceeded { max: 0 });
        }
        match kind {
            ValueKind::Nil => {
                self.try_nil(r)?;
            }
            ValueKind::Bool => {
                self.decode_bool(r)?;
            }
            ValueKind::Int | ValueKind::Uint | ValueKind::Float => {
                self.decode_number(r)?;
            }
            ValueKind::Str | ValueKind::Bytes => {
                self.decode_raw_str(r)?;
            }
            ValueKind::Array => {
                let len = self.read_array_start(r)?;
                let mut i = 0;
                while has_next(self, r, len, i)? {
                    self.read_array_elem(r, i)?;
                    self.swallow(r, depth_left - 1)?;
                    i += 1;
                }
                self.read_array_end(r)?;
            }
            ValueKind::Map => {
                let len = self.read_map_start(r)?;
                let mut i = 0;
                while has_next(self, r, len, i)? {
                    self.read_map_elem_key(r, i)?;
                    self.swallow(r, depth_left - 1)?;
                    self.read_map_elem_value(r)?;
                    self.swallow(r, depth_left - 1)?;
                    i += 1;
                }
                self.read_map_end(r)?;
            }
            ValueKind::Ext => match self.ext_mode() {
                ExtMode::Tagged => {
                    self.decode_ext_tag(r)?;
                    self.swallow(r, depth_left - 1)?;
                }
                _ => {
                    self.decode_ext_bytes(r)?;
                }
            },
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

/// Loop condition shared by every container walk.
pub(crate) fn has_next<D: DecDriver + ?Sized>(
    driver: &mut D,
    r: &mut dyn DecReader,
    len: Option<usize>,
    index: usize,
) -> Result<bool, DecodeError> {
    match len {
        Some(n) => Ok(index < n),
        None => Ok(!driver.check_break(r)?),
    }
}

/// Encode a value into a fresh byte vector.
pub fn to_vec<T: Reflect>(value: &T, handle: &dyn Handle) -> Result<Vec<u8>, EncodeError> {
    let mut enc = Encoder::new_bytes(handle);
    enc.encode(value)?;
    Ok(enc.take_bytes())
}

/// Decode a byte slice into a fresh value.
pub fn from_slice<T: Reflect + Default>(data: &[u8], handle: &dyn Handle) -> Result<T, DecodeError> {
    let mut out = T::default();
    decode_into(data, handle, &mut out)?;
    Ok(out)
}

/// Decode a byte slice into an existing value.
pub fn decode_into<T: Reflect>(data: &[u8], handle: &dyn Handle, target: &mut T) -> Result<(), DecodeError> {
    Decoder::from_bytes(data, handle).decode(target)
}

/// Materialise a dynamic value into a typed target.
pub fn from_value<T: Reflect + Default>(value: Value, handle: &dyn Handle) -> Result<T, DecodeError> {
    let mut out = T::default();
    let mut dec = Decoder::from_bytes(&[], handle);
    dec.decode_from_value(value, &mut out)?;
    Ok(out)
}
