//! MessagePack.
//!
//! By default byte strings are written with the raw/str family, the way
//! peers predating the `bin` and `ext` additions expect. Set
//! [`MsgpackHandle::write_ext`] to emit `bin 8/16/32` and `str 8` instead.
//! Extension values are always written with the `fixext`/`ext` family.

use crate::codec::wire::{put_u16, put_u32, put_u64, read_u16, read_u32, read_u64, read_u8, to_len};
use crate::codec::{DecDriver, DecReader, EncDriver, ExtMode, Number, ValueKind};
use crate::error::{DecodeError, EncodeError};
use crate::handle::{BasicHandle, Handle};

use super::{bad_descriptor, basic_accessors, peek_required};

const NIL: u8 = 0xc0;
const FALSE: u8 = 0xc2;
const TRUE: u8 = 0xc3;
const BIN8: u8 = 0xc4;
const BIN16: u8 = 0xc5;
const BIN32: u8 = 0xc6;
const EXT8: u8 = 0xc7;
const EXT16: u8 = 0xc8;
const EXT32: u8 = 0xc9;
const FLOAT32: u8 = 0xca;
const FLOAT64: u8 = 0xcb;
const UINT8: u8 = 0xcc;
const UINT16: u8 = 0xcd;
const UINT32: u8 = 0xce;
const UINT64: u8 = 0xcf;
const INT8: u8 = 0xd0;
const INT16: u8 = 0xd1;
const INT32: u8 = 0xd2;
const INT64: u8 = 0xd3;
const FIXEXT1: u8 = 0xd4;
const FIXEXT16: u8 = 0xd8;
const STR8: u8 = 0xd9;
const STR16: u8 = 0xda;
const STR32: u8 = 0xdb;
const ARRAY16: u8 = 0xdc;
const ARRAY32: u8 = 0xdd;
const MAP16: u8 = 0xde;
const MAP32: u8 = 0xdf;

const FORMAT: &str = "msgpack";

#[derive(Debug, Clone, Default)]
pub struct MsgpackHandle {
    basic: BasicHandle,
    /// Use the `bin` family for byte strings and `str 8` for short strings.
    pub write_ext: bool,
}

impl Handle for MsgpackHandle {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn is_binary(&self) -> bool {
        true
    }

    basic_accessors!();

    fn enc_driver(&self) -> Box<dyn EncDriver + '_> {
        Box::new(MsgpackEncDriver {
            write_ext: self.write_ext,
        })
    }

    fn dec_driver(&self) -> Box<dyn DecDriver + '_> {
        Box::new(MsgpackDecDriver)
    }
}

struct MsgpackEncDriver {
    write_ext: bool,
}

impl MsgpackEncDriver {
    fn put_container_len(&self, w: &mut Vec<u8>, fix: u8, b16: u8, b32: u8, len: usize) {
        if len < 16 {
            w.push(fix | len as u8);
        } else if len <= u16::MAX as usize {
            w.push(b16);
            put_u16(w, len as u16);
        } else {
            w.push(b32);
            put_u32(w, len as u32);
        }
    }

    fn put_str_len(&self, w: &mut Vec<u8>, len: usize) {
        if len < 32 {
            w.push(0xa0 | len as u8);
        } else if len <= u8::MAX as usize && self.write_ext {
            w.push(STR8);
            w.push(len as u8);
        } else if len <= u16::MAX as usize {
            w.push(STR16);
            put_u16(w, len as u16);
        } else {
            w.push(STR32);
            put_u32(w, len as u32);
        }
    }

    fn put_bin_len(&self, w: &mut Vec<u8>, len: usize) {
        if len <= u8::MAX as usize {
            w.push(BIN8);
            w.push(len as u8);
        } else if len <= u16::MAX as usize {
            w.push(BIN16);
            put_u16(w, len as u16);
        } else {
            w.push(BIN32);
            put_u32(w, len as u32);
        }
    }
}

impl EncDriver for MsgpackEncDriver {
    fn encode_nil(&mut self, w: &mut Vec<u8>) {
        w.push(NIL);
    }

    fn encode_bool(&mut self, w: &mut Vec<u8>, v: bool) {
        w.push(if v { TRUE } else { FALSE });
    }

    fn encode_int(&mut self, w: &mut Vec<u8>, v: i64) {
        if v >= 0 {
            self.encode_uint(w, v as u64);
        } else if v >= -32 {
            w.push(v as i8 as u8);
        } else if v >= i8::MIN as i64 {
            w.push(INT8);
            w.push(v as i8 as u8);
        } else if v >= i16::MIN as i64 {
            w.push(INT16);
            put_u16(w, v as i16 as u16);
        } else if v >= i32::MIN as i64 {
            w.push(INT32);
            put_u32(w, v as i32 as u32);
        } else {
            w.push(INT64);
            put_u64(w, v as u64);
        }
    }

    fn encode_uint(&mut self, w: &mut Vec<u8>, v: u64) {
        if v < 0x80 {
            w.push(v as u8);
        } else if v <= u8::MAX as u64 {
            w.push(UINT8);
            w.push(v as u8);
        } else if v <= u16::MAX as u64 {
            w.push(UINT16);
            put_u16(w, v as u16);
        } else if v <= u32::MAX as u64 {
            w.push(UINT32);
            put_u32(w, v as u32);
        } else {
            w.push(UINT64);
            put_u64(w, v);
        }
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
        self.put_str_len(w, v.len());
        w.extend_from_slice(v.as_bytes());
    }

    fn encode_bytes(&mut self, w: &mut Vec<u8>, v: &[u8]) {
        if self.write_ext {
            self.put_bin_len(w, v.len());
        } else {
            self.put_str_len(w, v.len());
        }
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
        match data.len() {
            1 => w.push(FIXEXT1),
            2 => w.push(FIXEXT1 + 1),
            4 => w.push(FIXEXT1 + 2),
            8 => w.push(FIXEXT1 + 3),
            16 => w.push(FIXEXT16),
            n if n <= u8::MAX as usize => {
                w.push(EXT8);
                w.push(n as u8);
            }
            n if n <= u16::MAX as usize => {
                w.push(EXT16);
                put_u16(w, n as u16);
            }
            n => {
                w.push(EXT32);
                put_u32(w, n as u32);
            }
        }
        w.push(tag);
        w.extend_from_slice(data);
        Ok(())
    }

    fn write_array_start(&mut self, w: &mut Vec<u8>, len: usize) {
        self.put_container_len(w, 0x90, ARRAY16, ARRAY32, len);
    }

    fn write_map_start(&mut self, w: &mut Vec<u8>, len: usize) {
        self.put_container_len(w, 0x80, MAP16, MAP32, len);
    }
}

struct MsgpackDecDriver;

fn kind_of(bd: u8) -> Option<ValueKind> {
    let kind = match bd {
        0x00..=0x7f | UINT8..=UINT64 => ValueKind::Uint,
        0xe0..=0xff | INT8..=INT64 => ValueKind::Int,
        0x80..=0x8f | MAP16 | MAP32 => ValueKind::Map,
        0x90..=0x9f | ARRAY16 | ARRAY32 => ValueKind::Array,
        0xa0..=0xbf | STR8..=STR32 => ValueKind::Str,
        NIL => ValueKind::Nil,
        FALSE | TRUE => ValueKind::Bool,
        BIN8..=BIN32 => ValueKind::Bytes,
        EXT8..=EXT32 | FIXEXT1..=FIXEXT16 => ValueKind::Ext,
        FLOAT32 | FLOAT64 => ValueKind::Float,
        _ => return None,
    };
    Some(kind)
}

fn describe(bd: u8) -> String {
    kind_of(bd).map_or_else(|| format!("descriptor {:#04x}", bd), |k| k.to_string())
}

impl MsgpackDecDriver {
    fn container_len(
        &self,
        r: &mut dyn DecReader,
        fix: u8,
        b16: u8,
        b32: u8,
        expected: &'static str,
    ) -> Result<usize, DecodeError> {
        let bd = peek_required(r)?;
        let len = if bd & 0xf0 == fix {
            u64::from(bd & 0x0f)
        } else if bd == b16 {
            r.read_byte()?;
            u64::from(read_u16(r)?)
        } else if bd == b32 {
            r.read_byte()?;
            u64::from(read_u32(r)?)
        } else {
            return Err(DecodeError::mismatch(expected, describe(bd)));
        };
        if bd & 0xf0 == fix {
            r.read_byte()?;
        }
        to_len(len, "msgpack container length")
    }
}

impl DecDriver for MsgpackDecDriver {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn next_kind(&mut self, r: &mut dyn DecReader) -> Result<ValueKind, DecodeError> {
        let bd = peek_required(r)?;
        kind_of(bd).ok_or_else(|| bad_descriptor(FORMAT, bd, r.num_read()))
    }

    fn try_nil(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        if r.peek_byte()? == Some(NIL) {
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
        match kind_of(bd) {
            Some(ValueKind::Uint | ValueKind::Int | ValueKind::Float) => {}
            Some(kind) => return Err(DecodeError::mismatch("number", kind)),
            None => return Err(bad_descriptor(FORMAT, bd, r.num_read())),
        }
        r.read_byte()?;
        let n = match bd {
            0x00..=0x7f => Number::Uint(u64::from(bd)),
            0xe0..=0xff => Number::Int(i64::from(bd as i8)),
            UINT8 => Number::Uint(u64::from(read_u8(r)?)),
            UINT16 => Number::Uint(u64::from(read_u16(r)?)),
            UINT32 => Number::Uint(u64::from(read_u32(r)?)),
            UINT64 => Number::Uint(read_u64(r)?),
            INT8 => Number::Int(i64::from(read_u8(r)? as i8)),
            INT16 => Number::Int(i64::from(read_u16(r)? as i16)),
            INT32 => Number::Int(i64::from(read_u32(r)? as i32)),
            INT64 => Number::Int(read_u64(r)? as i64),
            FLOAT32 => Number::Float(f64::from(f32::from_bits(read_u32(r)?))),
            _ => Number::Float(f64::from_bits(read_u64(r)?)),
        };
        Ok(n)
    }

    fn decode_raw_str(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        let bd = peek_required(r)?;
        let len = match bd {
            0xa0..=0xbf => u64::from(bd & 0x1f),
            STR8 | BIN8 | STR16 | BIN16 | STR32 | BIN32 => {
                r.read_byte()?;
                match bd {
                    STR8 | BIN8 => u64::from(read_u8(r)?),
                    STR16 | BIN16 => u64::from(read_u16(r)?),
                    _ => u64::from(read_u32(r)?),
                }
            }
            _ => return Err(DecodeError::mismatch("string", describe(bd))),
        };
        if (0xa0..=0xbf).contains(&bd) {
            r.read_byte()?;
        }
        let len = to_len(len, "msgpack string length")?;
        r.read_vec(len)
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Bytes
    }

    fn decode_ext_bytes(&mut self, r: &mut dyn DecReader) -> Result<(u64, Vec<u8>), DecodeError> {
        let offset = r.num_read();
        let bd = peek_required(r)?;
        if kind_of(bd) != Some(ValueKind::Ext) {
            return Err(DecodeError::mismatch("ext", describe(bd)));
        }
        r.read_byte()?;
        let len = match bd {
            FIXEXT1..=FIXEXT16 => 1u64 << (bd - FIXEXT1),
            EXT8 => u64::from(read_u8(r)?),
            EXT16 => u64::from(read_u16(r)?),
            EXT32 => u64::from(read_u32(r)?),
            _ => return Err(bad_descriptor(FORMAT, bd, offset)),
        };
        // The type byte is read unsigned, so -1 arrives as 255.
        let tag = read_u8(r)?;
        let len = to_len(len, "msgpack ext length")?;
        Ok((u64::from(tag), r.read_vec(len)?))
    }

    fn read_array_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        self.container_len(r, 0x90, ARRAY16, ARRAY32, "array").map(Some)
    }

    fn read_map_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        self.container_len(r, 0x80, MAP16, MAP32, "map").map(Some)
    }
}
