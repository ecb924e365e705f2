//! A decode driver reading from an in-memory [`Value`] instead of bytes.
//!
//! Swapped into a decoder to materialise dynamic values into typed targets,
//! so that every decode path (structs, extensions, interfaces) works the
//! same whether the input was bytes or an already-decoded tree.

use crate::codec::{DecDriver, DecReader, ExtMode, Number, ValueKind};
use crate::error::DecodeError;
use crate::value::Value;

enum Frame {
    Seq(std::vec::IntoIter<Value>),
    Map(std::vec::IntoIter<(Value, Value)>, Option<Value>),
}

pub struct ValueDriver {
    next: Option<Value>,
    stack: Vec<Frame>,
}

impl ValueDriver {
    pub fn new(value: Value) -> Self {
        ValueDriver {
            next: Some(value),
            stack: Vec::new(),
        }
    }

    fn peek(&self) -> Result<&Value, DecodeError> {
        self.next.as_ref().ok_or(DecodeError::UnexpectedEof { offset: 0 })
    }

    fn take(&mut self) -> Result<Value, DecodeError> {
        self.next.take().ok_or(DecodeError::UnexpectedEof { offset: 0 })
    }
}

impl DecDriver for ValueDriver {
    fn format(&self) -> &'static str {
        "value"
    }

    fn next_kind(&mut self, _r: &mut dyn DecReader) -> Result<ValueKind, DecodeError> {
        Ok(match self.peek()? {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Uint(_) => ValueKind::Uint,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Array(_) => ValueKind::Array,
            Value::Map(_) => ValueKind::Map,
            Value::Ext(_) => ValueKind::Ext,
        })
    }

    fn try_nil(&mut self, _r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        if matches!(self.next, Some(Value::Nil)) {
            self.next = None;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_bool(&mut self, _r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        match self.take()? {
            Value::Bool(b) => Ok(b),
            other => Err(DecodeError::mismatch("bool", other.type_name())),
        }
    }

    fn decode_number(&mut self, _r: &mut dyn DecReader) -> Result<Number, DecodeError> {
        match self.take()? {
            Value::Int(v) => Ok(Number::Int(v)),
            Value::Uint(v) => Ok(Number::Uint(v)),
            Value::Float(v) => Ok(Number::Float(v)),
            other => Err(DecodeError::mismatch("number", other.type_name())),
        }
    }

    fn decode_raw_str(&mut self, _r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        match self.take()? {
            Value::Str(s) => Ok(s.into_bytes()),
            Value::Bytes(b) => Ok(b),
            other => Err(DecodeError::mismatch("string", other.type_name())),
        }
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Tagged
    }

    fn decode_ext_bytes(&mut self, _r: &mut dyn DecReader) -> Result<(u64, Vec<u8>), DecodeError> {
        match self.take()? {
            Value::Ext(x) => Ok((x.tag, x.data)),
            other => Err(DecodeError::mismatch("ext", other.type_name())),
        }
    }

    fn decode_ext_tag(&mut self, _r: &mut dyn DecReader) -> Result<u64, DecodeError> {
        match self.take()? {
            Value::Ext(x) => {
                self.next = Some(match x.value {
                    Some(v) => *v,
                    None => Value::Bytes(x.data),
                });
                Ok(x.tag)
            }
            other => Err(DecodeError::mismatch("ext", other.type_name())),
        }
    }

    fn read_array_start(&mut self, _r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        match self.take()? {
            Value::Array(items) => {
                let len = items.len();
                self.stack.push(Frame::Seq(items.into_iter()));
                Ok(Some(len))
            }
            other => Err(DecodeError::mismatch("array", other.type_name())),
        }
    }

    fn read_array_elem(&mut self, _r: &mut dyn DecReader, _index: usize) -> Result<(), DecodeError> {
        match self.stack.last_mut() {
            Some(Frame::Seq(it)) => {
                self.next = it.next();
                Ok(())
            }
            _ => Err(DecodeError::Other("array element outside an array".into())),
        }
    }

    fn read_array_end(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        self.stack.pop();
        Ok(())
    }

    fn read_map_start(&mut self, _r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        match self.take()? {
            Value::Map(entries) => {
                let len = entries.len();
                self.stack.push(Frame::Map(entries.into_iter(), None));
                Ok(Some(len))
            }
            other => Err(DecodeError::mismatch("map", other.type_name())),
        }
    }

    fn read_map_elem_key(&mut self, _r: &mut dyn DecReader, _index: usize) -> Result<(), DecodeError> {
        match self.stack.last_mut() {
            Some(Frame::Map(it, pending)) => {
                let (k, v) = it
                    .next()
                    .ok_or(DecodeError::UnexpectedEof { offset: 0 })?;
                self.next = Some(k);
                *pending = Some(v);
                Ok(())
            }
            _ => Err(DecodeError::Other("map key outside a map".into())),
        }
    }

    fn read_map_elem_value(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        match self.stack.last_mut() {
            Some(Frame::Map(_, pending)) => {
                self.next = pending.take();
                Ok(())
            }
            _ => Err(DecodeError::Other("map value outside a map".into())),
        }
    }

    fn read_map_end(&mut self, _r: &mut dyn DecReader) -> Result<(), DecodeError> {
        self.stack.pop();
        Ok(())
    }

    fn reset(&mut self) {
        self.next = None;
        self.stack.clear();
    }
}
