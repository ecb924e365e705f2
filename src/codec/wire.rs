//! Big-endian wire utilities shared by the binary formats.

use crate::codec::reader::DecReader;
use crate::error::DecodeError;

/// Append a 16-bit unsigned integer in big-endian.
#[inline]
pub fn put_u16(w: &mut Vec<u8>, val: u16) {
    w.extend_from_slice(&val.to_be_bytes());
}

/// Append a 32-bit unsigned integer in big-endian.
#[inline]
pub fn put_u32(w: &mut Vec<u8>, val: u32) {
    w.extend_from_slice(&val.to_be_bytes());
}

/// Append a 64-bit unsigned integer in big-endian.
#[inline]
pub fn put_u64(w: &mut Vec<u8>, val: u64) {
    w.extend_from_slice(&val.to_be_bytes());
}

/// Append a descriptor byte followed by `val` in the smallest of 1, 2, 4
/// or 8 big-endian bytes. The descriptor is `base + 0..=3` by width.
pub fn put_sized_uint(w: &mut Vec<u8>, base: u8, val: u64) {
    if val <= u8::MAX as u64 {
        w.push(base);
        w.push(val as u8);
    } else if val <= u16::MAX as u64 {
        w.push(base + 1);
        put_u16(w, val as u16);
    } else if val <= u32::MAX as u64 {
        w.push(base + 2);
        put_u32(w, val as u32);
    } else {
        w.push(base + 3);
        put_u64(w, val);
    }
}

#[inline]
pub fn read_u8(r: &mut dyn DecReader) -> Result<u8, DecodeError> {
    r.read_byte()
}

#[inline]
pub fn read_u16(r: &mut dyn DecReader) -> Result<u16, DecodeError> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

#[inline]
pub fn read_u32(r: &mut dyn DecReader) -> Result<u32, DecodeError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

#[inline]
pub fn read_u64(r: &mut dyn DecReader) -> Result<u64, DecodeError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_be_bytes(b))
}

/// Read a big-endian unsigned integer of `n` bytes (1 to 8).
pub fn read_uint_n(r: &mut dyn DecReader, n: usize) -> Result<u64, DecodeError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b[8 - n..])?;
    Ok(u64::from_be_bytes(b))
}

/// Convert a length read from the wire into `usize`.
pub fn to_len(len: u64, context: &'static str) -> Result<usize, DecodeError> {
    usize::try_from(len).map_err(|_| DecodeError::InvalidLength { len, context })
}

/// Negate a wire magnitude into `i64`. `2^63` maps to `i64::MIN`.
pub fn neg_magnitude(mag: u64) -> Result<i64, DecodeError> {
    if mag <= i64::MAX as u64 {
        Ok(-(mag as i64))
    } else if mag == 1u64 << 63 {
        Ok(i64::MIN)
    } else {
        Err(DecodeError::Overflow {
            value: format!("-{}", mag),
            target: "i64",
        })
    }
}

/// Decode an IEEE 754 half-precision float.
pub fn f16_to_f32(h: u16) -> f32 {
    let sign = ((h >> 15) & 1) as u32;
    let exp = ((h >> 10) & 0x1f) as u32;
    let frac = (h & 0x3ff) as u32;
    let bits = match (exp, frac) {
        (0, 0) => sign << 31,
        (0, _) => {
            // Subnormal: normalise into an f32 exponent.
            let mut e: i32 = -14;
            let mut f = frac;
            while f & 0x400 == 0 {
                f <<= 1;
                e -= 1;
            }
            f &= 0x3ff;
            (sign << 31) | (((e + 127) as u32) << 23) | (f << 13)
        }
        (0x1f, 0) => (sign << 31) | 0x7f80_0000,
        (0x1f, _) => (sign << 31) | 0x7fc0_0000 | (frac << 13),
        _ => (sign << 31) | ((exp + 127 - 15) << 23) | (frac << 13),
    };
    f32::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::reader::BytesReader;

    #[test]
    fn test_put_sized_uint() {
        let mut w = Vec::new();
        put_sized_uint(&mut w, 8, 7);
        put_sized_uint(&mut w, 8, 300);
        put_sized_uint(&mut w, 8, 70_000);
        put_sized_uint(&mut w, 8, u64::MAX);
        assert_eq!(&w[..2], &[8, 7]);
        assert_eq!(&w[2..5], &[9, 0x01, 0x2c]);
        assert_eq!(w[5], 10);
        assert_eq!(w[10], 11);
        assert_eq!(w.len(), 19);
    }

    #[test]
    fn test_read_write_roundtrip() {
        let mut w = Vec::new();
        put_u16(&mut w, 0x1234);
        put_u32(&mut w, 0x12345678);
        put_u64(&mut w, 0x0102030405060708);
        assert_eq!(&w[..2], &[0x12, 0x34]);
        let mut r = BytesReader::new(&w);
        assert_eq!(read_u16(&mut r).unwrap(), 0x1234);
        assert_eq!(read_u32(&mut r).unwrap(), 0x12345678);
        assert_eq!(read_u64(&mut r).unwrap(), 0x0102030405060708);
    }

    #[test]
    fn test_read_uint_n() {
        let mut r = BytesReader::new(&[0x01, 0x00, 0x00]);
        assert_eq!(read_uint_n(&mut r, 3).unwrap(), 0x010000);
    }

    #[test]
    fn test_neg_magnitude() {
        assert_eq!(neg_magnitude(5).unwrap(), -5);
        assert_eq!(neg_magnitude(1 << 63).unwrap(), i64::MIN);
        assert!(neg_magnitude((1 << 63) + 1).is_err());
    }

    #[test]
    fn test_f16() {
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x7c00), f32::INFINITY);
        assert_eq!(f16_to_f32(0x0001), 5.960_464_5e-8);
        assert!(f16_to_f32(0x7e00).is_nan());
    }
}
