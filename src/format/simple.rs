//! Simple: a compact binary format with one descriptor byte per value.
//!
//! Descriptor layout:
//!
//! | byte(s)   | value                                        |
//! |-----------|----------------------------------------------|
//! | 1         | nil                                          |
//! | 2, 3      | false, true                                  |
//! | 4, 5      | f32, f64 (big-endian payload)                |
//! | 8..=11    | non-negative int in 1, 2, 4, 8 bytes         |
//! | 12..=15   | negative int magnitude in 1, 2, 4, 8 bytes   |
//! | 216..=220 | string; low bits give the length width       |
//! | 224..=228 | byte string                                  |
//! | 232..=236 | array                                        |
//! | 240..=244 | map                                          |
//! | 248..=252 | ext: length, one tag byte, payload           |
//!
//! For length-prefixed kinds the low three bits are 0 for an empty value,
//! else 1 to 4 for a length in 1, 2, 4 or 8 bytes.

use crate::codec::wire::{
    neg_magnitude, put_sized_uint, put_u32, put_u64, read_u32, read_u64, read_uint_n, to_len,
};
use crate::codec::{DecDriver, DecReader, EncDriver, ExtMode, Number, ValueKind};
use crate::error::{DecodeError, EncodeError};
use crate::handle::{BasicHandle, Handle};

use super::{bad_descriptor, basic_accessors, peek_required};

const NIL: u8 = 1;
const FALSE: u8 = 2;
const TRUE: u8 = 3;
const FLOAT32: u8 = 4;
const FLOAT64: u8 = 5;
const POS_INT: u8 = 8;
const NEG_INT: u8 = 12;
const STRING: u8 = 216;
const BYTES: u8 = 224;
const ARRAY: u8 = 232;
const MAP: u8 = 240;
const EXT: u8 = 248;

const FORMAT: &str = "simple";

#[derive(Debug, Clone, Default)]
pub struct SimpleHandle {
    basic: BasicHandle,
}

impl Handle for SimpleHandle {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn is_binary(&self) -> bool {
        true
    }

    basic_accessors!();

    fn enc_driver(&self) -> Box<dyn EncDriver + '_> {
        Box::new(SimpleEncDriver)
    }

    fn dec_driver(&self) -> Box<dyn DecDriver + '_> {
        Box::new(SimpleDecDriver)
    }
}

fn put_len(w: &mut Vec<u8>, base: u8, len: usize) {
    let len = len as u64;
    if len == 0 {
        w.push(base);
    } else {
        put_sized_uint(w, base + 1, len);
    }
}

struct SimpleEncDriver;

impl EncDriver for SimpleEncDriver {
    fn encode_nil(&mut self, w: &mut Vec<u8>) {
        w.push(NIL);
    }

    fn encode_bool(&mut self, w: &mut Vec<u8>, v: bool) {
        w.push(if v { TRUE } else { FALSE });
    }

    fn encode_int(&mut self, w: &mut Vec<u8>, v: i64) {
        if v < 0 {
            put_sized_uint(w, NEG_INT, v.unsigned_abs());
        } else {
            put_sized_uint(w, POS_INT, v as u64);
        }
    }

    fn encode_uint(&mut self, w: &mut Vec<u8>, v: u64) {
        put_sized_uint(w, POS_INT, v);
    }

    fn encode_f32(&mut self, w: &mut Vec<u8>, v: f32) {
        w.push(FLOAT32);
        put_u32(w, v.to_bits());
    }

    fn encode_f64(&mut self, w: &mut Vec<u8>, v: f64) {
        w.push(FLOAT64);
        put_u64(w, v.to_bits());
    }

    fn encode_str(&mut self, w: &mut Vec<u8>, v: &str) {
        put_len(w, STRING, v.len());
        w.extend_from_slice(v.as_bytes());
    }

    fn encode_bytes(&mut self, w: &mut Vec<u8>, v: &[u8]) {
        put_len(w, BYTES, v.len());
        w.extend_from_slice(v);
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Bytes
    }

    fn encode_ext_bytes(&mut self, w: &mut Vec<u8>, tag: u64, data: &[u8]) -> Result<(), EncodeError> {
        let tag = u8::try_from(tag).map_err(|_| EncodeError::Unsupported {
            format: FORMAT,
            what: format!("ext tag {} (max 255)", tag),
        })?;
        put_len(w, EXT, data.len());
        w.push(tag);
        w.extend_from_slice(data);
        Ok(())
    }

    fn write_array_start(&mut self, w: &mut Vec<u8>, len: usize) {
        put_len(w, ARRAY, len);
    }

    fn write_map_start(&mut self, w: &mut Vec<u8>, len: usize) {
        put_len(w, MAP, len);
    }
}

struct SimpleDecDriver;

impl SimpleDecDriver {
    fn read_len(&self, r: &mut dyn DecReader, base: u8) -> Result<usize, DecodeError> {
        let offset = r.num_read();
        let bd = r.read_byte()?;
        if bd < base || bd > base + 4 {
            return Err(bad_descriptor(FORMAT, bd, offset));
        }
        let len = match bd - base {
            0 => 0,
            w => read_uint_n(r, 1 << (w - 1))?,
        };
        to_len(len, "simple length")
    }

    fn read_str_payload(&self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        let bd = peek_required(r)?;
        let base = bd & 0xf8;
        if base != STRING && base != BYTES {
            return Err(DecodeError::mismatch("string", kind_of(bd)));
        }
        let len = self.read_len(r, base)?;
        r.read_vec(len)
    }
}

fn kind_of(bd: u8) -> ValueKind {
    match bd {
        NIL => ValueKind::Nil,
        FALSE | TRUE => ValueKind::Bool,
        FLOAT32 | FLOAT64 => ValueKind::Float,
        8..=11 => ValueKind::Uint,
        12..=15 => ValueKind::Int,
        _ => match bd & 0xf8 {
            STRING => ValueKind::Str,
            BYTES => ValueKind::Bytes,
            ARRAY => ValueKind::Array,
            MAP => ValueKind::Map,
            _ => ValueKind::Ext,
        },
    }
}

fn valid(bd: u8) -> bool {
    matches!(bd, 1..=5 | 8..=15)
        || (bd >= STRING && (bd & 0x07) <= 4 && matches!(bd & 0xf8, STRING | BYTES | ARRAY | MAP | EXT))
}

impl DecDriver for SimpleDecDriver {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn next_kind(&mut self, r: &mut dyn DecReader) -> Result<ValueKind, DecodeError> {
        let bd = peek_required(r)?;
        if !valid(bd) {
            return Err(bad_descriptor(FORMAT, bd, r.num_read()));
        }
        Ok(kind_of(bd))
    }

    fn try_nil(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        if r.peek_byte()? == Some(NIL) {
            r.read_byte()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_bool(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        match peek_required(r)? {
            FALSE => {
                r.read_byte()?;
                Ok(false)
            }
            TRUE => {
                r.read_byte()?;
                Ok(true)
            }
            bd => Err(DecodeError::mismatch("bool", kind_of(bd))),
        }
    }

    fn decode_number(&mut self, r: &mut dyn DecReader) -> Result<Number, DecodeError> {
        let bd = peek_required(r)?;
        let n = match bd {
            FLOAT32 => {
                r.read_byte()?;
                Number::Float(f32::from_bits(read_u32(r)?) as f64)
            }
            FLOAT64 => {
                r.read_byte()?;
                Number::Float(f64::from_bits(read_u64(r)?))
            }
            8..=11 => {
                r.read_byte()?;
                Number::Uint(read_uint_n(r, 1 << (bd - POS_INT))?)
            }
            12..=15 => {
                r.read_byte()?;
                let mag = read_uint_n(r, 1 << (bd - NEG_INT))?;
                Number::Int(neg_magnitude(mag)?)
            }
            _ => return Err(DecodeError::mismatch("number", kind_of(bd))),
        };
        Ok(n)
    }

    fn decode_raw_str(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        self.read_str_payload(r)
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Bytes
    }

    fn decode_ext_bytes(&mut self, r: &mut dyn DecReader) -> Result<(u64, Vec<u8>), DecodeError> {
        let bd = peek_required(r)?;
        if bd & 0xf8 != EXT {
            return Err(DecodeError::mismatch("ext", kind_of(bd)));
        }
        let len = self.read_len(r, EXT)?;
        let tag = r.read_byte()?;
        Ok((u64::from(tag), r.read_vec(len)?))
    }

    fn read_array_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        let bd = peek_required(r)?;
        if bd & 0xf8 != ARRAY {
            return Err(DecodeError::mismatch("array", kind_of(bd)));
        }
        self.read_len(r, ARRAY).map(Some)
    }

    fn read_map_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        let bd = peek_required(r)?;
        if bd & 0xf8 != MAP {
            return Err(DecodeError::mismatch("map", kind_of(bd)));
        }
        self.read_len(r, MAP).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_slice, to_vec};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_descriptor_bytes() {
        let h = SimpleHandle::default();
        assert_eq!(to_vec(&5u8, &h).unwrap(), vec![POS_INT, 5]);
        assert_eq!(to_vec(&-300i32, &h).unwrap(), vec![NEG_INT + 1, 0x01, 0x2c]);
        assert_eq!(to_vec(&String::new(), &h).unwrap(), vec![STRING]);
        assert_eq!(to_vec(&"ab".to_string(), &h).unwrap(), vec![STRING + 1, 2, b'a', b'b']);
        assert_eq!(to_vec(&Vec::<u32>::new(), &h).unwrap(), vec![ARRAY]);
        assert_eq!(to_vec(&Option::<u8>::None, &h).unwrap(), vec![NIL]);
    }

    #[test]
    fn test_ext_tag_width() {
        let h = SimpleHandle::default();
        let x = crate::value::RawExt::with_data(300, vec![1]);
        assert!(matches!(
            to_vec(&x, &h),
            Err(EncodeError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_invalid_descriptor() {
        let h = SimpleHandle::default();
        let err = from_slice::<Value>(&[0x07], &h).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidDescriptor { byte: 7, .. }));
    }

    #[test]
    fn test_i64_min() {
        let h = SimpleHandle::default();
        let b = to_vec(&i64::MIN, &h).unwrap();
        assert_eq!(from_slice::<i64>(&b, &h).unwrap(), i64::MIN);
    }
}
