//! The dynamic types: [`Value`], [`RawExt`] and [`Raw`].

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::reflect::{Raw, Reflect};
use crate::types::{Describe, Shape};
use crate::value::{RawExt, Value};

impl Describe for Value {
    fn shape() -> Shape {
        Shape::Dynamic
    }
}

impl Reflect for Value {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        match self {
            Value::Nil => e.encode_nil(),
            Value::Bool(b) => e.encode_bool(*b),
            Value::Int(v) => e.encode_int(*v),
            Value::Uint(v) => e.encode_uint(*v),
            Value::Float(v) => e.encode_f64(*v),
            Value::Str(s) => e.encode_str(s),
            Value::Bytes(b) => e.encode_bytes(b),
            Value::Array(items) => e.encode_seq(items.len(), items.iter().map(|v| v as &dyn Reflect)),
            Value::Map(entries) => e.encode_map(
                entries.len(),
                entries
                    .iter()
                    .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect)),
            ),
            Value::Ext(x) => e.encode_raw_ext(x),
        }
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        *self = d.read_dynamic()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        self.is_zero()
    }

    fn reset_zero(&mut self) {
        *self = Value::Nil;
    }

    crate::reflect_any!();
}

impl Describe for RawExt {
    fn shape() -> Shape {
        Shape::Ext
    }
}

impl Reflect for RawExt {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_raw_ext(self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        *self = d.read_raw_ext()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        self.tag == 0 && self.data.is_empty() && self.value.is_none()
    }

    fn reset_zero(&mut self) {
        *self = RawExt::default();
    }

    crate::reflect_any!();
}

impl Describe for Raw {
    fn shape() -> Shape {
        Shape::Raw
    }
}

impl Reflect for Raw {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_raw(&self.0)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        self.0 = d.read_raw()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        self.0.is_empty()
    }

    fn reset_zero(&mut self) {
        self.0.clear();
    }

    crate::reflect_any!();
}
