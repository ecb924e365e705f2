//! `Reflect` and `Describe` for std types.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;
use std::sync::Arc;

use crate::codec::decoder::MapTarget;
use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::reflect::{Codec, Reflect, SeqTarget};
use crate::types::{Describe, Scalar, Shape, TypeRef};

impl Describe for bool {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Bool)
    }
}

impl Reflect for bool {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_bool(*self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        *self = d.read_bool()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }

    fn reset_zero(&mut self) {
        *self = false;
    }

    crate::reflect_any!();
}

macro_rules! int_impls {
    ($($t:ty => $bits:expr),* $(,)?) => {$(
        impl Describe for $t {
            fn shape() -> Shape {
                Shape::Scalar(Scalar::Int { bits: $bits })
            }
        }

        impl Reflect for $t {
            fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
                e.encode_int(*self as i64)
            }

            fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
                let v = d.read_i64()?;
                *self = <$t>::try_from(v).map_err(|_| DecodeError::Overflow {
                    value: v.to_string(),
                    target: stringify!($t),
                })?;
                Ok(())
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }

            fn reset_zero(&mut self) {
                *self = 0;
            }

            crate::reflect_any!();
        }
    )*};
}

int_impls!(i8 => 8, i16 => 16, i32 => 32, i64 => 64, isize => 64);

macro_rules! uint_impls {
    ($($t:ty => $bits:expr),* $(,)?) => {$(
        impl Describe for $t {
            fn shape() -> Shape {
                Shape::Scalar(Scalar::Uint { bits: $bits })
            }
        }

        impl Reflect for $t {
            fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
                e.encode_uint(*self as u64)
            }

            fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
                let v = d.read_u64()?;
                *self = <$t>::try_from(v).map_err(|_| DecodeError::Overflow {
                    value: v.to_string(),
                    target: stringify!($t),
                })?;
                Ok(())
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }

            fn reset_zero(&mut self) {
                *self = 0;
            }

            crate::reflect_any!();
        }
    )*};
}

uint_impls!(u8 => 8, u16 => 16, u32 => 32, u64 => 64, usize => 64);

impl Describe for f32 {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Float { bits: 32 })
    }
}

impl Reflect for f32 {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_f32(*self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let v = d.read_f64()?;
        if v.is_finite() && v.abs() > f32::MAX as f64 {
            return Err(DecodeError::Overflow {
                value: v.to_string(),
                target: "f32",
            });
        }
        *self = v as f32;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }

    fn reset_zero(&mut self) {
        *self = 0.0;
    }

    crate::reflect_any!();
}

impl Describe for f64 {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Float { bits: 64 })
    }
}

impl Reflect for f64 {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_f64(*self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        *self = d.read_f64()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }

    fn reset_zero(&mut self) {
        *self = 0.0;
    }

    crate::reflect_any!();
}

// A char travels as its code point.
impl Describe for char {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Uint { bits: 32 })
    }
}

impl Reflect for char {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_uint(u64::from(*self))
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let v = d.read_u64()?;
        *self = u32::try_from(v)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| DecodeError::mismatch("char", format!("code point {}", v)))?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        *self == '\0'
    }

    fn reset_zero(&mut self) {
        *self = '\0';
    }

    crate::reflect_any!();
}

impl Describe for String {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Str)
    }
}

impl Reflect for String {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_str(self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        *self = d.read_string()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn reset_zero(&mut self) {
        self.clear();
    }

    crate::reflect_any!();
}

impl Describe for Arc<str> {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Str)
    }
}

impl Reflect for Arc<str> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_str(self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        *self = d.read_shared_str()?;
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn reset_zero(&mut self) {
        *self = Arc::from("");
    }

    crate::reflect_any!();
}

// The unit type is an empty record.
impl Describe for () {
    fn shape() -> Shape {
        Shape::Scalar(Scalar::Unit)
    }
}

impl Reflect for () {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_map(0, std::iter::empty())
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.swallow()
    }

    fn is_empty_value(&self) -> bool {
        true
    }

    fn reset_zero(&mut self) {}

    crate::reflect_any!();
}

fn is_u8<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<u8>()
}

impl<T: Codec + Default> Describe for Vec<T> {
    fn shape() -> Shape {
        if is_u8::<T>() {
            Shape::Scalar(Scalar::Bytes)
        } else {
            Shape::Seq(TypeRef::of::<T>())
        }
    }
}

impl<T: Codec + Default> Reflect for Vec<T> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        if let Some(bytes) = (&*self as &dyn Any).downcast_ref::<Vec<u8>>() {
            return e.encode_bytes(bytes);
        }
        e.encode_seq(self.len(), self.iter().map(|x| x as &dyn Reflect))
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        if let Some(bytes) = (&mut *self as &mut dyn Any).downcast_mut::<Vec<u8>>() {
            *bytes = d.read_bytes()?;
            return Ok(());
        }
        d.decode_seq(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn reset_zero(&mut self) {
        self.clear();
    }

    crate::reflect_any!();
}

// Existing elements are decoded over in place; the length follows the stream.
impl<T: Codec + Default> SeqTarget for Vec<T> {
    fn begin(&mut self, reserve: usize) {
        self.reserve(reserve.saturating_sub(self.len()));
    }

    fn decode_elem(&mut self, index: usize, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        if index >= self.len() {
            self.push(T::default());
        }
        d.decode_value(&mut self[index])
    }

    fn finish(&mut self, count: usize) -> Result<(), DecodeError> {
        self.truncate(count);
        Ok(())
    }
}

impl<T: Codec + Default, const N: usize> Describe for [T; N] {
    fn shape() -> Shape {
        Shape::Array(TypeRef::of::<T>(), N)
    }
}

impl<T: Codec + Default, const N: usize> Reflect for [T; N] {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        if let Some(bytes) = (&*self as &dyn Any).downcast_ref::<[u8; N]>() {
            return e.encode_bytes(bytes);
        }
        e.encode_seq(N, self.iter().map(|x| x as &dyn Reflect))
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        if let Some(bytes) = (&mut *self as &mut dyn Any).downcast_mut::<[u8; N]>() {
            let data = d.read_bytes()?;
            if data.len() > N && d.options().error_if_no_array_expand {
                return Err(DecodeError::ArrayOverflow { len: N, index: N });
            }
            let n = data.len().min(N);
            bytes[..n].copy_from_slice(&data[..n]);
            bytes[n..].fill(0);
            return Ok(());
        }
        d.decode_seq(self)
    }

    fn is_empty_value(&self) -> bool {
        self.iter().all(|x| x.is_empty_value())
    }

    fn reset_zero(&mut self) {
        self.iter_mut().for_each(|x| x.reset_zero());
    }

    crate::reflect_any!();
}

// Fixed arrays cannot grow: excess elements fail or are dropped per handle.
impl<T: Codec + Default, const N: usize> SeqTarget for [T; N] {
    fn begin(&mut self, _reserve: usize) {}

    fn decode_elem(&mut self, index: usize, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match self.get_mut(index) {
            Some(slot) => d.decode_value(slot),
            None if d.options().error_if_no_array_expand => {
                Err(DecodeError::ArrayOverflow { len: N, index })
            }
            None => d.swallow(),
        }
    }

    fn finish(&mut self, count: usize) -> Result<(), DecodeError> {
        self.iter_mut().skip(count).for_each(|x| x.reset_zero());
        Ok(())
    }
}

/// Keyed containers decoded through [`MapSink`].
trait EntryMap {
    type K: Codec + Default;
    type V: Codec + Default;

    fn reserve_entries(&mut self, n: usize);
    fn remove_key(&mut self, k: &Self::K);
    fn slot(&mut self, k: Self::K) -> &mut Self::V;
}

impl<K, V, S> EntryMap for HashMap<K, V, S>
where
    K: Codec + Default + Eq + Hash,
    V: Codec + Default,
    S: BuildHasher,
{
    type K = K;
    type V = V;

    fn reserve_entries(&mut self, n: usize) {
        self.reserve(n);
    }

    fn remove_key(&mut self, k: &K) {
        self.remove(k);
    }

    fn slot(&mut self, k: K) -> &mut V {
        self.entry(k).or_default()
    }
}

impl<K, V> EntryMap for BTreeMap<K, V>
where
    K: Codec + Default + Ord,
    V: Codec + Default,
{
    type K = K;
    type V = V;

    fn reserve_entries(&mut self, _n: usize) {}

    fn remove_key(&mut self, k: &K) {
        self.remove(k);
    }

    fn slot(&mut self, k: K) -> &mut V {
        self.entry(k).or_default()
    }
}

struct MapSink<'m, M: EntryMap> {
    map: &'m mut M,
    key: Option<M::K>,
}

impl<M: EntryMap> MapTarget for MapSink<'_, M> {
    fn begin(&mut self, reserve: usize) {
        self.map.reserve_entries(reserve);
    }

    fn decode_key(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let mut k = M::K::default();
        d.decode_value(&mut k)?;
        self.key = Some(k);
        Ok(())
    }

    fn decode_value(&mut self, d: &mut Decoder<'_>, nil: bool) -> Result<(), DecodeError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| DecodeError::Other("map value without a key".into()))?;
        if !nil {
            return d.decode_value(self.map.slot(key));
        }
        if d.options().delete_on_nil_map_value {
            self.map.remove_key(&key);
        } else {
            *self.map.slot(key) = M::V::default();
        }
        Ok(())
    }
}

impl<K, V, S> Describe for HashMap<K, V, S>
where
    K: Codec + Default + Eq + Hash,
    V: Codec + Default,
    S: BuildHasher + Default + 'static,
{
    fn shape() -> Shape {
        Shape::Map(TypeRef::of::<K>(), TypeRef::of::<V>())
    }
}

impl<K, V, S> Reflect for HashMap<K, V, S>
where
    K: Codec + Default + Eq + Hash,
    V: Codec + Default,
    S: BuildHasher + Default + 'static,
{
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_map(
            self.len(),
            self.iter().map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect)),
        )
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_map(&mut MapSink { map: self, key: None })
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn reset_zero(&mut self) {
        self.clear();
    }

    crate::reflect_any!();
}

impl<K, V> Describe for BTreeMap<K, V>
where
    K: Codec + Default + Ord,
    V: Codec + Default,
{
    fn shape() -> Shape {
        Shape::Map(TypeRef::of::<K>(), TypeRef::of::<V>())
    }
}

impl<K, V> Reflect for BTreeMap<K, V>
where
    K: Codec + Default + Ord,
    V: Codec + Default,
{
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_map(
            self.len(),
            self.iter().map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect)),
        )
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_map(&mut MapSink { map: self, key: None })
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn reset_zero(&mut self) {
        self.clear();
    }

    crate::reflect_any!();
}

impl<T: Codec + Default> Describe for Option<T> {
    fn shape() -> Shape {
        Shape::Ptr(TypeRef::of::<T>())
    }
}

impl<T: Codec + Default> Reflect for Option<T> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        match self {
            Some(v) => e.encode_value(v),
            None => e.encode_nil(),
        }
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_value(self.get_or_insert_with(T::default))
    }

    fn is_empty_value(&self) -> bool {
        self.is_none()
    }

    fn reset_zero(&mut self) {
        *self = None;
    }

    fn pointee(&self) -> Option<&dyn Reflect> {
        self.as_ref().map(|v| v as &dyn Reflect)
    }

    fn pointee_mut(&mut self) -> Option<&mut dyn Reflect> {
        Some(self.get_or_insert_with(T::default))
    }

    crate::reflect_any!();
}

impl<T: Codec + Default> Describe for Box<T> {
    fn shape() -> Shape {
        Shape::Ptr(TypeRef::of::<T>())
    }
}

impl<T: Codec + Default> Reflect for Box<T> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_value(&**self)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_value(&mut **self)
    }

    fn is_empty_value(&self) -> bool {
        (**self).is_empty_value()
    }

    fn reset_zero(&mut self) {
        (**self).reset_zero();
    }

    fn pointee(&self) -> Option<&dyn Reflect> {
        Some(&**self)
    }

    fn pointee_mut(&mut self) -> Option<&mut dyn Reflect> {
        Some(&mut **self)
    }

    crate::reflect_any!();
}

macro_rules! shared_ptr_impls {
    ($($ptr:ident),*) => {$(
        impl<T: Codec + Default> Describe for $ptr<T> {
            fn shape() -> Shape {
                Shape::Ptr(TypeRef::of::<T>())
            }
        }

        // Shared targets are tracked by address for circular detection.
        // Decoding replaces the target unless this is the only owner.
        impl<T: Codec + Default> Reflect for $ptr<T> {
            fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
                e.encode_shared(&**self, $ptr::as_ptr(self) as usize)
            }

            fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
                if let Some(inner) = $ptr::get_mut(self) {
                    return d.decode_value(inner);
                }
                let mut fresh = T::default();
                d.decode_value(&mut fresh)?;
                *self = $ptr::new(fresh);
                Ok(())
            }

            fn is_empty_value(&self) -> bool {
                (**self).is_empty_value()
            }

            fn reset_zero(&mut self) {
                *self = $ptr::new(T::default());
            }

            fn pointee(&self) -> Option<&dyn Reflect> {
                Some(&**self)
            }

            fn pointee_mut(&mut self) -> Option<&mut dyn Reflect> {
                $ptr::get_mut(self).map(|v| v as &mut dyn Reflect)
            }

            crate::reflect_any!();
        }
    )*};
}

shared_ptr_impls!(Rc, Arc);

impl<T: Codec + Default> Describe for RefCell<T> {
    fn shape() -> Shape {
        Shape::Ptr(TypeRef::of::<T>())
    }
}

impl<T: Codec + Default> Reflect for RefCell<T> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        let inner = self.try_borrow().map_err(|_| {
            EncodeError::Other(format!("{} is mutably borrowed", std::any::type_name::<T>()))
        })?;
        e.encode_value(&*inner)
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_value(self.get_mut())
    }

    fn is_empty_value(&self) -> bool {
        self.try_borrow().map(|v| v.is_empty_value()).unwrap_or(false)
    }

    fn reset_zero(&mut self) {
        self.get_mut().reset_zero();
    }

    fn pointee_mut(&mut self) -> Option<&mut dyn Reflect> {
        Some(self.get_mut())
    }

    crate::reflect_any!();
}

#[cfg(test)]
mod tests {
    use crate::codec::{from_slice, to_vec};
    use crate::error::DecodeError;
    use crate::format::msgpack::MsgpackHandle;
    use crate::handle::Handle;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_narrowing_overflows() {
        let h = MsgpackHandle::default();
        let b = to_vec(&300i64, &h).unwrap();
        assert!(matches!(
            from_slice::<i8>(&b, &h),
            Err(DecodeError::Overflow { target: "i8", .. })
        ));
        assert_eq!(from_slice::<u16>(&b, &h).unwrap(), 300);
    }

    #[test]
    fn test_bytes_vs_seq() {
        let h = MsgpackHandle::default();
        assert_eq!(to_vec(&vec![1u8, 2], &h).unwrap(), vec![0xa2, 1, 2]);
        assert_eq!(to_vec(&vec![1u16, 2], &h).unwrap(), vec![0x92, 1, 2]);
        // A byte string feeds a non-byte sequence element by element.
        let v: Vec<u16> = from_slice(&[0xa2, 7, 9], &h).unwrap();
        assert_eq!(v, vec![7, 9]);
    }

    #[test]
    fn test_array_overflow() {
        let mut h = MsgpackHandle::default();
        let b = to_vec(&vec![1u32, 2, 3], &h).unwrap();
        assert!(matches!(
            from_slice::<[u32; 2]>(&b, &h),
            Err(DecodeError::ArrayOverflow { len: 2, index: 2 })
        ));
        h.basic_mut().decode.error_if_no_array_expand = false;
        assert_eq!(from_slice::<[u32; 2]>(&b, &h).unwrap(), [1, 2]);
    }

    #[test]
    fn test_decode_merges_into_existing_map() {
        let h = MsgpackHandle::default();
        let mut m: HashMap<String, u8> = HashMap::new();
        m.insert("keep".into(), 1);
        let b = to_vec(&HashMap::from([("new".to_string(), 2u8)]), &h).unwrap();
        crate::codec::decode_into(&b, &h, &mut m).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m["new"], 2);
    }

    #[test]
    fn test_vec_shrinks_to_stream_length() {
        let h = MsgpackHandle::default();
        let mut v = vec![5u32, 6, 7];
        let b = to_vec(&vec![1u32], &h).unwrap();
        crate::codec::decode_into(&b, &h, &mut v).unwrap();
        assert_eq!(v, vec![1]);
    }
}
