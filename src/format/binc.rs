//! Binc: a binary format whose descriptor byte splits into a 4-bit value
//! type (`vd`) and a 4-bit sub-descriptor (`vs`).
//!
//! Integers are written with leading zero bytes pruned, small positive
//! integers and the common specials (nil, booleans, zero, minus one,
//! non-finite floats) fit in the descriptor alone, and lengths under 12
//! are stored directly in `vs`.

use crate::codec::wire::{neg_magnitude, put_u16, put_u32, put_u64, read_u32, read_u64, read_uint_n, to_len};
use crate::codec::{DecDriver, DecReader, EncDriver, ExtMode, Number, ValueKind};
use crate::error::{DecodeError, EncodeError};
use crate::handle::{BasicHandle, Handle};

use super::{bad_descriptor, basic_accessors, peek_required};

const VD_SPECIAL: u8 = 0;
const VD_POS_INT: u8 = 1;
const VD_NEG_INT: u8 = 2;
const VD_FLOAT: u8 = 3;
const VD_STRING: u8 = 4;
const VD_BYTES: u8 = 5;
const VD_ARRAY: u8 = 6;
const VD_MAP: u8 = 7;
const VD_SMALL_INT: u8 = 9;
const VD_CUSTOM_EXT: u8 = 15;

const SP_NIL: u8 = 0;
const SP_FALSE: u8 = 1;
const SP_TRUE: u8 = 2;
const SP_NAN: u8 = 3;
const SP_POS_INF: u8 = 4;
const SP_NEG_INF: u8 = 5;
const SP_ZERO_FLOAT: u8 = 6;
const SP_ZERO: u8 = 7;
const SP_NEG_ONE: u8 = 8;

const FL_BIN32: u8 = 1;
const FL_BIN64: u8 = 3;

const FORMAT: &str = "binc";

#[inline]
fn desc(vd: u8, vs: u8) -> u8 {
    (vd << 4) | vs
}

#[derive(Debug, Clone, Default)]
pub struct BincHandle {
    basic: BasicHandle,
}

impl Handle for BincHandle {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn is_binary(&self) -> bool {
        true
    }

    basic_accessors!();

    fn enc_driver(&self) -> Box<dyn EncDriver + '_> {
        Box::new(BincEncDriver)
    }

    fn dec_driver(&self) -> Box<dyn DecDriver + '_> {
        Box::new(BincDecDriver)
    }
}

/// Write `v` with leading zero bytes dropped; `vs` is the byte count minus one.
fn put_pruned(w: &mut Vec<u8>, vd: u8, v: u64) {
    let n = (8 - (v.leading_zeros() / 8) as usize).max(1);
    w.push(desc(vd, (n - 1) as u8));
    w.extend_from_slice(&v.to_be_bytes()[8 - n..]);
}

fn put_len(w: &mut Vec<u8>, vd: u8, len: usize) {
    if len < 12 {
        w.push(desc(vd, len as u8 + 4));
    } else if len <= u8::MAX as usize {
        w.push(desc(vd, 0));
        w.push(len as u8);
    } else if len <= u16::MAX as usize {
        w.push(desc(vd, 1));
        put_u16(w, len as u16);
    } else if len <= u32::MAX as usize {
        w.push(desc(vd, 2));
        put_u32(w, len as u32);
    } else {
        w.push(desc(vd, 3));
        put_u64(w, len as u64);
    }
}

struct BincEncDriver;

impl BincEncDriver {
    fn put_positive(&self, w: &mut Vec<u8>, v: u64) {
        match v {
            0 => w.push(desc(VD_SPECIAL, SP_ZERO)),
            1..=16 => w.push(desc(VD_SMALL_INT, (v - 1) as u8)),
            _ => put_pruned(w, VD_POS_INT, v),
        }
    }
}

impl EncDriver for BincEncDriver {
    fn encode_nil(&mut self, w: &mut Vec<u8>) {
        w.push(desc(VD_SPECIAL, SP_NIL));
    }

    fn encode_bool(&mut self, w: &mut Vec<u8>, v: bool) {
        w.push(desc(VD_SPECIAL, if v { SP_TRUE } else { SP_FALSE }));
    }

    fn encode_int(&mut self, w: &mut Vec<u8>, v: i64) {
        match v {
            -1 => w.push(desc(VD_SPECIAL, SP_NEG_ONE)),
            v if v < 0 => put_pruned(w, VD_NEG_INT, v.unsigned_abs()),
            v => self.put_positive(w, v as u64),
        }
    }

    fn encode_uint(&mut self, w: &mut Vec<u8>, v: u64) {
        self.put_positive(w, v);
    }

    fn encode_f32(&mut self, w: &mut Vec<u8>, v: f32) {
        if v.is_finite() && v.to_bits() != 0 {
            w.push(desc(VD_FLOAT, FL_BIN32));
            put_u32(w, v.to_bits());
        } else {
            self.encode_f64(w, v as f64);
        }
    }

    fn encode_f64(&mut self, w: &mut Vec<u8>, v: f64) {
        let special = if v.is_nan() {
            Some(SP_NAN)
        } else if v == f64::INFINITY {
            Some(SP_POS_INF)
        } else if v == f64::NEG_INFINITY {
            Some(SP_NEG_INF)
        } else if v.to_bits() == 0 {
            Some(SP_ZERO_FLOAT)
        } else {
            None
        };
        match special {
            Some(sp) => w.push(desc(VD_SPECIAL, sp)),
            None => {
                w.push(desc(VD_FLOAT, FL_BIN64));
                put_u64(w, v.to_bits());
            }
        }
    }

    fn encode_str(&mut self, w: &mut Vec<u8>, v: &str) {
        put_len(w, VD_STRING, v.len());
        w.extend_from_slice(v.as_bytes());
    }

    fn encode_bytes(&mut self, w: &mut Vec<u8>, v: &[u8]) {
        put_len(w, VD_BYTES, v.len());
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
        put_len(w, VD_CUSTOM_EXT, data.len());
        w.push(tag);
        w.extend_from_slice(data);
        Ok(())
    }

    fn write_array_start(&mut self, w: &mut Vec<u8>, len: usize) {
        put_len(w, VD_ARRAY, len);
    }

    fn write_map_start(&mut self, w: &mut Vec<u8>, len: usize) {
        put_len(w, VD_MAP, len);
    }
}

struct BincDecDriver;

fn split(bd: u8) -> (u8, u8) {
    (bd >> 4, bd & 0x0f)
}

fn kind_of(bd: u8) -> Option<ValueKind> {
    let (vd, vs) = split(bd);
    let kind = match vd {
        VD_SPECIAL => match vs {
            SP_NIL => ValueKind::Nil,
            SP_FALSE | SP_TRUE => ValueKind::Bool,
            SP_NAN | SP_POS_INF | SP_NEG_INF | SP_ZERO_FLOAT => ValueKind::Float,
            SP_ZERO => ValueKind::Uint,
            SP_NEG_ONE => ValueKind::Int,
            _ => return None,
        },
        VD_POS_INT if vs < 8 => ValueKind::Uint,
        VD_NEG_INT if vs < 8 => ValueKind::Int,
        VD_FLOAT if vs == FL_BIN32 || vs == FL_BIN64 => ValueKind::Float,
        VD_STRING => ValueKind::Str,
        VD_BYTES => ValueKind::Bytes,
        VD_ARRAY => ValueKind::Array,
        VD_MAP => ValueKind::Map,
        VD_SMALL_INT => ValueKind::Uint,
        VD_CUSTOM_EXT => ValueKind::Ext,
        _ => return None,
    };
    Some(kind)
}

fn describe(bd: u8) -> String {
    kind_of(bd).map_or_else(|| format!("descriptor {:#04x}", bd), |k| k.to_string())
}

impl BincDecDriver {
    fn read_len(&self, r: &mut dyn DecReader, vd: u8) -> Result<usize, DecodeError> {
        let offset = r.num_read();
        let bd = r.read_byte()?;
        let (got, vs) = split(bd);
        if got != vd {
            return Err(bad_descriptor(FORMAT, bd, offset));
        }
        let len = match vs {
            0..=3 => read_uint_n(r, 1 << vs)?,
            _ => u64::from(vs - 4),
        };
        to_len(len, "binc length")
    }

    fn expect(&self, r: &mut dyn DecReader, vd: u8, expected: &'static str) -> Result<(), DecodeError> {
        let bd = peek_required(r)?;
        if split(bd).0 != vd {
            return Err(DecodeError::mismatch(expected, describe(bd)));
        }
        Ok(())
    }
}

impl DecDriver for BincDecDriver {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn next_kind(&mut self, r: &mut dyn DecReader) -> Result<ValueKind, DecodeError> {
        let bd = peek_required(r)?;
        kind_of(bd).ok_or_else(|| bad_descriptor(FORMAT, bd, r.num_read()))
    }

    fn try_nil(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        if r.peek_byte()? == Some(desc(VD_SPECIAL, SP_NIL)) {
            r.read_byte()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_bool(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        let bd = peek_required(r)?;
        let v = match split(bd) {
            (VD_SPECIAL, SP_FALSE) => false,
            (VD_SPECIAL, SP_TRUE) => true,
            _ => return Err(DecodeError::mismatch("bool", describe(bd))),
        };
        r.read_byte()?;
        Ok(v)
    }

    fn decode_number(&mut self, r: &mut dyn DecReader) -> Result<Number, DecodeError> {
        let offset = r.num_read();
        let bd = peek_required(r)?;
        let (vd, vs) = split(bd);
        let n = match (vd, vs) {
            (VD_SPECIAL, SP_ZERO) => Number::Uint(0),
            (VD_SPECIAL, SP_NEG_ONE) => Number::Int(-1),
            (VD_SPECIAL, SP_ZERO_FLOAT) => Number::Float(0.0),
            (VD_SPECIAL, SP_NAN) => Number::Float(f64::NAN),
            (VD_SPECIAL, SP_POS_INF) => Number::Float(f64::INFINITY),
            (VD_SPECIAL, SP_NEG_INF) => Number::Float(f64::NEG_INFINITY),
            (VD_SMALL_INT, _) => Number::Uint(u64::from(vs) + 1),
            (VD_POS_INT, 0..=7) => {
                r.read_byte()?;
                return Ok(Number::Uint(read_uint_n(r, vs as usize + 1)?));
            }
            (VD_NEG_INT, 0..=7) => {
                r.read_byte()?;
                let mag = read_uint_n(r, vs as usize + 1)?;
                return Ok(Number::Int(neg_magnitude(mag)?));
            }
            (VD_FLOAT, FL_BIN32) => {
                r.read_byte()?;
                return Ok(Number::Float(f32::from_bits(read_u32(r)?) as f64));
            }
            (VD_FLOAT, FL_BIN64) => {
                r.read_byte()?;
                return Ok(Number::Float(f64::from_bits(read_u64(r)?)));
            }
            (VD_FLOAT, _) => return Err(bad_descriptor(FORMAT, bd, offset)),
            _ => return Err(DecodeError::mismatch("number", describe(bd))),
        };
        r.read_byte()?;
        Ok(n)
    }

    fn decode_raw_str(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        let bd = peek_required(r)?;
        let vd = split(bd).0;
        if vd != VD_STRING && vd != VD_BYTES {
            return Err(DecodeError::mismatch("string", describe(bd)));
        }
        let len = self.read_len(r, vd)?;
        r.read_vec(len)
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Bytes
    }

    fn decode_ext_bytes(&mut self, r: &mut dyn DecReader) -> Result<(u64, Vec<u8>), DecodeError> {
        self.expect(r, VD_CUSTOM_EXT, "ext")?;
        let len = self.read_len(r, VD_CUSTOM_EXT)?;
        let tag = r.read_byte()?;
        Ok((u64::from(tag), r.read_vec(len)?))
    }

    fn read_array_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        self.expect(r, VD_ARRAY, "array")?;
        self.read_len(r, VD_ARRAY).map(Some)
    }

    fn read_map_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        self.expect(r, VD_MAP, "map")?;
        self.read_len(r, VD_MAP).map(Some)
    }
}
