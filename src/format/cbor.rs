//! CBOR (RFC 8949).
//!
//! Every item starts with a head byte: the major type in the top three bits
//! and the additional information in the low five. Extensions travel as
//! semantic tags (major type 6) wrapping an ordinary value.

use crate::codec::wire::{f16_to_f32, put_u16, put_u32, put_u64, read_u16, read_u32, read_u64, read_u8, to_len};
use crate::codec::{DecDriver, DecReader, EncDriver, ExtMode, Number, ValueKind};
use crate::error::{DecodeError, EncodeError};
use crate::handle::{BasicHandle, Handle};

use super::{bad_descriptor, basic_accessors, peek_required};

const MAJOR_UINT: u8 = 0;
const MAJOR_NEG_INT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const AI_INDEFINITE: u8 = 31;

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;
const NIL: u8 = 0xf6;
const UNDEFINED: u8 = 0xf7;
const FLOAT16: u8 = 0xf9;
const FLOAT32: u8 = 0xfa;
const FLOAT64: u8 = 0xfb;
const BREAK: u8 = 0xff;

const FORMAT: &str = "cbor";

#[derive(Debug, Clone, Default)]
pub struct CborHandle {
    basic: BasicHandle,
    /// Write arrays and maps with an indefinite length and a break marker.
    pub indefinite_length: bool,
}

impl Handle for CborHandle {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn is_binary(&self) -> bool {
        true
    }

    basic_accessors!();

    fn enc_driver(&self) -> Box<dyn EncDriver + '_> {
        Box::new(CborEncDriver {
            indefinite: self.indefinite_length,
        })
    }

    fn dec_driver(&self) -> Box<dyn DecDriver + '_> {
        Box::new(CborDecDriver)
    }
}

fn put_head(w: &mut Vec<u8>, major: u8, arg: u64) {
    let m = major << 5;
    if arg < 24 {
        w.push(m | arg as u8);
    } else if arg <= u8::MAX as u64 {
        w.push(m | 24);
        w.push(arg as u8);
    } else if arg <= u16::MAX as u64 {
        w.push(m | 25);
        put_u16(w, arg as u16);
    } else if arg <= u32::MAX as u64 {
        w.push(m | 26);
        put_u32(w, arg as u32);
    } else {
        w.push(m | 27);
        put_u64(w, arg);
    }
}

struct CborEncDriver {
    indefinite: bool,
}

impl EncDriver for CborEncDriver {
    fn encode_nil(&mut self, w: &mut Vec<u8>) {
        w.push(NIL);
    }

    fn encode_bool(&mut self, w: &mut Vec<u8>, v: bool) {
        w.push(if v { TRUE } else { FALSE });
    }

    fn encode_int(&mut self, w: &mut Vec<u8>, v: i64) {
        if v < 0 {
            // -1 - n, computed without overflow at i64::MIN.
            put_head(w, MAJOR_NEG_INT, !(v as u64));
        } else {
            put_head(w, MAJOR_UINT, v as u64);
        }
    }

    fn encode_uint(&mut self, w: &mut Vec<u8>, v: u64) {
        put_head(w, MAJOR_UINT, v);
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
        put_head(w, MAJOR_TEXT, v.len() as u64);
        w.extend_from_slice(v.as_bytes());
    }

    fn encode_bytes(&mut self, w: &mut Vec<u8>, v: &[u8]) {
        put_head(w, MAJOR_BYTES, v.len() as u64);
        w.extend_from_slice(v);
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Tagged
    }

    fn encode_ext_tag(&mut self, w: &mut Vec<u8>, tag: u64) -> Result<(), EncodeError> {
        put_head(w, MAJOR_TAG, tag);
        Ok(())
    }

    fn write_array_start(&mut self, w: &mut Vec<u8>, len: usize) {
        if self.indefinite {
            w.push((MAJOR_ARRAY << 5) | AI_INDEFINITE);
        } else {
            put_head(w, MAJOR_ARRAY, len as u64);
        }
    }

    fn write_array_end(&mut self, w: &mut Vec<u8>) {
        if self.indefinite {
            w.push(BREAK);
        }
    }

    fn write_map_start(&mut self, w: &mut Vec<u8>, len: usize) {
        if self.indefinite {
            w.push((MAJOR_MAP << 5) | AI_INDEFINITE);
        } else {
            put_head(w, MAJOR_MAP, len as u64);
        }
    }

    fn write_map_end(&mut self, w: &mut Vec<u8>) {
        if self.indefinite {
            w.push(BREAK);
        }
    }
}

struct CborDecDriver;

fn kind_of(bd: u8) -> Option<ValueKind> {
    let kind = match bd >> 5 {
        MAJOR_UINT => ValueKind::Uint,
        MAJOR_NEG_INT => ValueKind::Int,
        MAJOR_BYTES => ValueKind::Bytes,
        MAJOR_TEXT => ValueKind::Str,
        MAJOR_ARRAY => ValueKind::Array,
        MAJOR_MAP => ValueKind::Map,
        MAJOR_TAG => ValueKind::Ext,
        MAJOR_SIMPLE => match bd {
            FALSE | TRUE => ValueKind::Bool,
            NIL | UNDEFINED => ValueKind::Nil,
            FLOAT16 | FLOAT32 | FLOAT64 => ValueKind::Float,
            _ => return None,
        },
        _ => return None,
    };
    Some(kind)
}

fn describe(bd: u8) -> String {
    match kind_of(bd) {
        Some(k) => k.to_string(),
        None if bd == BREAK => "break".to_string(),
        None => format!("descriptor {:#04x}", bd),
    }
}

impl CborDecDriver {
    /// Read a head of the given major type. `None` means indefinite length.
    fn read_head(&self, r: &mut dyn DecReader, major: u8, expected: &'static str) -> Result<Option<u64>, DecodeError> {
        let offset = r.num_read();
        let bd = peek_required(r)?;
        if bd >> 5 != major {
            return Err(DecodeError::mismatch(expected, describe(bd)));
        }
        r.read_byte()?;
        let arg = match bd & 0x1f {
            ai @ 0..=23 => u64::from(ai),
            24 => u64::from(read_u8(r)?),
            25 => u64::from(read_u16(r)?),
            26 => u64::from(read_u32(r)?),
            27 => read_u64(r)?,
            AI_INDEFINITE if matches!(major, MAJOR_BYTES | MAJOR_TEXT | MAJOR_ARRAY | MAJOR_MAP) => {
                return Ok(None);
            }
            _ => return Err(bad_descriptor(FORMAT, bd, offset)),
        };
        Ok(Some(arg))
    }

    fn read_container(&self, r: &mut dyn DecReader, major: u8, expected: &'static str) -> Result<Option<usize>, DecodeError> {
        match self.read_head(r, major, expected)? {
            Some(n) => Ok(Some(to_len(n, "cbor container length")?)),
            None => Ok(None),
        }
    }
}

impl DecDriver for CborDecDriver {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn next_kind(&mut self, r: &mut dyn DecReader) -> Result<ValueKind, DecodeError> {
        let bd = peek_required(r)?;
        kind_of(bd).ok_or_else(|| bad_descriptor(FORMAT, bd, r.num_read()))
    }

    fn try_nil(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        if matches!(r.peek_byte()?, Some(NIL | UNDEFINED)) {
            r.read_byte()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_bool(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        let v = match peek_required(r)? {
            FALSE => false,
            TRUE => true,
            bd => return Err(DecodeError::mismatch("bool", describe(bd))),
        };
        r.read_byte()?;
        Ok(v)
    }

    fn decode_number(&mut self, r: &mut dyn DecReader) -> Result<Number, DecodeError> {
        let bd = peek_required(r)?;
        match bd >> 5 {
            MAJOR_UINT => Ok(Number::Uint(self.read_head(r, MAJOR_UINT, "number")?.unwrap_or(0))),
            MAJOR_NEG_INT => {
                let n = self.read_head(r, MAJOR_NEG_INT, "number")?.unwrap_or(0);
                if n > i64::MAX as u64 {
                    return Err(DecodeError::Overflow {
                        value: format!("-1-{}", n),
                        target: "i64",
                    });
                }
                Ok(Number::Int(-1 - n as i64))
            }
            MAJOR_SIMPLE => {
                let v = match bd {
                    FLOAT16 => {
                        r.read_byte()?;
                        f64::from(f16_to_f32(read_u16(r)?))
                    }
                    FLOAT32 => {
                        r.read_byte()?;
                        f64::from(f32::from_bits(read_u32(r)?))
                    }
                    FLOAT64 => {
                        r.read_byte()?;
                        f64::from_bits(read_u64(r)?)
                    }
                    _ => return Err(DecodeError::mismatch("number", describe(bd))),
                };
                Ok(Number::Float(v))
            }
            _ => Err(DecodeError::mismatch("number", describe(bd))),
        }
    }

    fn decode_raw_str(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        let bd = peek_required(r)?;
        let major = bd >> 5;
        if major != MAJOR_BYTES && major != MAJOR_TEXT {
            return Err(DecodeError::mismatch("string", describe(bd)));
        }
        match self.read_head(r, major, "string")? {
            Some(n) => r.read_vec(to_len(n, "cbor string length")?),
            None => {
                // Indefinite: definite chunks of the same major type until break.
                let mut out = Vec::new();
                loop {
                    if peek_required(r)? == BREAK {
                        r.read_byte()?;
                        return Ok(out);
                    }
                    let offset = r.num_read();
                    match self.read_head(r, major, "string chunk")? {
                        Some(n) => out.extend(r.read_vec(to_len(n, "cbor chunk length")?)?),
                        None => {
                            return Err(DecodeError::Syntax {
                                format: FORMAT,
                                offset,
                                message: "nested indefinite string chunk".into(),
                            })
                        }
                    }
                }
            }
        }
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Tagged
    }

    fn decode_ext_tag(&mut self, r: &mut dyn DecReader) -> Result<u64, DecodeError> {
        Ok(self.read_head(r, MAJOR_TAG, "ext")?.unwrap_or(0))
    }

    fn read_array_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        self.read_container(r, MAJOR_ARRAY, "array")
    }

    fn read_map_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        self.read_container(r, MAJOR_MAP, "map")
    }

    fn check_break(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        if peek_required(r)? == BREAK {
            r.read_byte()?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_slice, to_vec};
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn test_heads() {
        let h = CborHandle::default();
        assert_eq!(to_vec(&23u8, &h).unwrap(), vec![0x17]);
        assert_eq!(to_vec(&24u8, &h).unwrap(), vec![0x18, 24]);
        assert_eq!(to_vec(&-1i32, &h).unwrap(), vec![0x20]);
        assert_eq!(to_vec(&-500i32, &h).unwrap(), vec![0x39, 0x01, 0xf3]);
        assert_eq!(to_vec(&"a".to_string(), &h).unwrap(), vec![0x61, b'a']);
        assert_eq!(to_vec(&Option::<u8>::None, &h).unwrap(), vec![0xf6]);
        assert_eq!(from_slice::<i64>(&to_vec(&i64::MIN, &h).unwrap(), &h).unwrap(), i64::MIN);
    }

    #[test]
    fn test_indefinite_containers() {
        let h = CborHandle {
            indefinite_length: true,
            ..Default::default()
        };
        let b = to_vec(&vec![1u8, 2], &h).unwrap();
        // Vec<u8> is a byte string, never a container.
        assert_eq!(b, vec![0x42, 1, 2]);

        let b = to_vec(&vec![1u32, 2], &h).unwrap();
        assert_eq!(b, vec![0x9f, 1, 2, 0xff]);
        assert_eq!(from_slice::<Vec<u32>>(&b, &h).unwrap(), vec![1, 2]);

        let mut m = BTreeMap::new();
        m.insert("k".to_string(), 1u8);
        let b = to_vec(&m, &h).unwrap();
        assert_eq!(b, vec![0xbf, 0x61, b'k', 1, 0xff]);
        assert_eq!(from_slice::<BTreeMap<String, u8>>(&b, &h).unwrap(), m);
    }

    #[test]
    fn test_indefinite_string_and_half_float() {
        let h = CborHandle::default();
        let s: String = from_slice(&[0x7f, 0x62, b'a', b'b', 0x61, b'c', 0xff], &h).unwrap();
        assert_eq!(s, "abc");
        let f: f32 = from_slice(&[0xf9, 0x3c, 0x00], &h).unwrap();
        assert_eq!(f, 1.0);
        assert!(matches!(from_slice::<Value>(&[0xf7], &h).unwrap(), Value::Nil));
    }

    #[test]
    fn test_simple_values() {
        assert_eq!(kind_of(0xf4), Some(ValueKind::Bool));
        assert_eq!(kind_of(0xf7), Some(ValueKind::Nil));
        assert_eq!(kind_of(0xfb), Some(ValueKind::Float));
        // Unassigned simple values and the break byte have no kind.
        assert_eq!(kind_of(0xe0), None);
        assert_eq!(kind_of(BREAK), None);

        let mut d = CborDecDriver;
        let mut r = crate::codec::reader::BytesReader::new(&[0xfa, 0x3f, 0xc0, 0x00, 0x00]);
        assert!(matches!(d.decode_number(&mut r), Ok(Number::Float(v)) if v == 1.5));
        for bad in [&[0xf5u8][..], &[0x61, b'a'], &[0x80]] {
            let mut r = crate::codec::reader::BytesReader::new(bad);
            assert!(
                matches!(d.decode_number(&mut r), Err(DecodeError::TypeMismatch { expected: "number", .. })),
                "{:02x?}",
                bad
            );
        }
    }

    #[test]
    fn test_unknown_tag_is_ext() {
        let h = CborHandle::default();
        match from_slice::<Value>(&[0xd8, 0x64, 0x01], &h).unwrap() {
            Value::Ext(x) => {
                assert_eq!(x.tag, 100);
                assert!(matches!(x.value.as_deref(), Some(Value::Uint(1))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
