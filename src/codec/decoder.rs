//! Decode session: reads one format's stream into values in place.

use std::any::TypeId;
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use crate::codec::reader::{BytesReader, IoReader};
use crate::codec::value_driver::ValueDriver;
use crate::codec::{has_next, DecDriver, DecReader, ExtMode, Number, ValueKind};
use crate::error::{DecodeError, Error, ExtError};
use crate::ext::ExtensionBinding;
use crate::handle::{DecodeOptions, Handle};
use crate::reflect::{Raw, Reflect, SelfMarshal, SeqTarget};
use crate::types::{PathStep, TypeDescriptor};
use crate::value::{RawExt, Value};

/// Destination of a map decode. Keys and values alternate; each value call
/// belongs to the key decoded just before it.
pub trait MapTarget {
    fn begin(&mut self, reserve: usize);

    fn decode_key(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError>;

    /// Decode the value for the pending key. `nil` is set when the stream
    /// held a null, which has already been consumed.
    fn decode_value(&mut self, d: &mut Decoder<'_>, nil: bool) -> Result<(), DecodeError>;
}

/// Decoder bound to one handle and one input.
pub struct Decoder<'a> {
    handle: &'a dyn Handle,
    driver: Box<dyn DecDriver + 'a>,
    reader: Box<dyn DecReader + 'a>,
    depth: usize,
    interned: HashSet<Arc<str>>,
}

impl<'a> Decoder<'a> {
    /// Decoder over any reader. Input is buffered internally.
    pub fn new<R: Read + 'a>(reader: R, handle: &'a dyn Handle) -> Self {
        Decoder {
            handle,
            driver: handle.dec_driver(),
            reader: Box::new(IoReader::new(reader)),
            depth: 0,
            interned: HashSet::new(),
        }
    }

    /// Decoder over an in-memory slice.
    pub fn from_bytes(data: &'a [u8], handle: &'a dyn Handle) -> Self {
        Decoder {
            handle,
            driver: handle.dec_driver(),
            reader: Box::new(BytesReader::new(data)),
            depth: 0,
            interned: HashSet::new(),
        }
    }

    pub fn reset<R: Read + 'a>(&mut self, reader: R) {
        self.reader = Box::new(IoReader::new(reader));
        self.driver.reset();
        self.depth = 0;
        self.interned.clear();
    }

    pub fn reset_bytes(&mut self, data: &'a [u8]) {
        self.reader = Box::new(BytesReader::new(data));
        self.driver.reset();
        self.depth = 0;
        self.interned.clear();
    }

    pub fn handle(&self) -> &'a dyn Handle {
        self.handle
    }

    pub fn options(&self) -> &'a DecodeOptions {
        let handle = self.handle;
        &handle.basic().decode
    }

    /// Bytes consumed so far.
    pub fn num_read(&self) -> usize {
        self.reader.num_read()
    }

    /// Decode the next top-level value into `target`.
    ///
    /// Returns [`DecodeError::EndOfStream`] when the input ends cleanly
    /// before the value starts.
    pub fn decode<T: Reflect>(&mut self, target: &mut T) -> Result<(), DecodeError> {
        if self.at_end()? {
            return Err(DecodeError::EndOfStream);
        }
        self.decode_value(target)
    }

    /// Start a top-level value: whether the input ended cleanly instead.
    pub fn at_end(&mut self) -> Result<bool, DecodeError> {
        self.depth = 0;
        self.driver.skip_insignificant(&mut *self.reader)?;
        Ok(self.reader.peek_byte()?.is_none())
    }

    /// Like [`Decoder::decode`], panicking with the error as payload.
    /// Recover it with [`crate::recover`].
    pub fn must_decode<T: Reflect>(&mut self, target: &mut T) {
        if let Err(e) = self.decode(target) {
            std::panic::panic_any(Error::Decode(e));
        }
    }

    /// Decode any nested value.
    ///
    /// Order: raw capture, null, bound extension, then the value's own shape.
    pub fn decode_value(&mut self, v: &mut dyn Reflect) -> Result<(), DecodeError> {
        let handle = self.handle;
        let bh = handle.basic();
        let id = v.as_any().type_id();
        if bh.raw && id == TypeId::of::<Raw>() {
            return v.decode_with(self);
        }
        if self.try_nil()? {
            v.reset_zero();
            return Ok(());
        }
        if bh.has_extensions() {
            if let Some(binding) = bh.extension(id) {
                return self.decode_ext(binding, v);
            }
        }
        v.decode_with(self)
    }

    /// Decode `value` into `target` as if it had been read from the stream.
    pub fn decode_from_value(&mut self, value: Value, target: &mut dyn Reflect) -> Result<(), DecodeError> {
        self.with_value_source(value, |d| d.decode_value(target))
    }

    fn with_value_source<R>(
        &mut self,
        value: Value,
        f: impl FnOnce(&mut Self) -> Result<R, DecodeError>,
    ) -> Result<R, DecodeError> {
        let driver = std::mem::replace(&mut self.driver, Box::new(ValueDriver::new(value)));
        let reader = std::mem::replace(&mut self.reader, Box::new(BytesReader::new(&[])));
        let res = f(self);
        self.driver = driver;
        self.reader = reader;
        res
    }

    fn decode_ext(&mut self, b: &ExtensionBinding, v: &mut dyn Reflect) -> Result<(), DecodeError> {
        let tag = b.tag;
        let ext_err = move |source| DecodeError::Extension { tag, source };
        let check = |got: u64| {
            if got == tag {
                Ok(())
            } else {
                Err(ext_err(ExtError::new(format!(
                    "stream tag {} does not match {}",
                    got, tag
                ))))
            }
        };
        match self.driver.ext_mode() {
            ExtMode::Bytes => {
                let (got, data) = self.driver.decode_ext_bytes(&mut *self.reader)?;
                check(got)?;
                b.ext.read_ext(v.as_any_mut(), &data).map_err(ext_err)
            }
            ExtMode::Tagged => {
                let got = self.driver.decode_ext_tag(&mut *self.reader)?;
                check(got)?;
                let value = self.read_tagged_payload()?;
                b.ext.update_ext(v.as_any_mut(), value).map_err(ext_err)
            }
            ExtMode::Value => {
                let value = self.read_dynamic()?;
                b.ext.update_ext(v.as_any_mut(), value).map_err(ext_err)
            }
        }
    }

    // --- stream primitives ---

    pub fn peek_kind(&mut self) -> Result<ValueKind, DecodeError> {
        self.driver.next_kind(&mut *self.reader)
    }

    /// Consume a null if one is next.
    pub fn try_nil(&mut self) -> Result<bool, DecodeError> {
        self.driver.try_nil(&mut *self.reader)
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        self.driver.decode_bool(&mut *self.reader)
    }

    pub fn read_number(&mut self) -> Result<Number, DecodeError> {
        self.driver.decode_number(&mut *self.reader)
    }

    /// Read any number as `i64`. Integral floats are accepted.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        match self.read_number()? {
            Number::Int(v) => Ok(v),
            Number::Uint(v) => i64::try_from(v).map_err(|_| overflow(v, "i64")),
            Number::Float(f) => {
                if f.fract() == 0.0 && f >= -9.223_372_036_854_776e18 && f < 9.223_372_036_854_776e18 {
                    Ok(f as i64)
                } else {
                    Err(DecodeError::mismatch("integer", format!("float {}", f)))
                }
            }
        }
    }

    /// Read any number as `u64`. Negative values overflow.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        match self.read_number()? {
            Number::Int(v) => u64::try_from(v).map_err(|_| overflow(v, "u64")),
            Number::Uint(v) => Ok(v),
            Number::Float(f) => {
                if f.fract() == 0.0 && f >= 0.0 && f < 1.844_674_407_370_955_2e19 {
                    Ok(f as u64)
                } else {
                    Err(DecodeError::mismatch("unsigned integer", format!("float {}", f)))
                }
            }
        }
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(match self.read_number()? {
            Number::Int(v) => v as f64,
            Number::Uint(v) => v as f64,
            Number::Float(f) => f,
        })
    }

    /// Read a string. Byte strings holding UTF-8 are accepted.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        self.driver.decode_text(&mut *self.reader)
    }

    /// Read a string as a shared slice, interned when the handle asks.
    pub fn read_shared_str(&mut self) -> Result<Arc<str>, DecodeError> {
        let s = self.read_string()?;
        if !self.options().intern_string {
            return Ok(Arc::from(s));
        }
        if let Some(existing) = self.interned.get(s.as_str()) {
            return Ok(existing.clone());
        }
        let shared: Arc<str> = Arc::from(s);
        self.interned.insert(shared.clone());
        Ok(shared)
    }

    /// Read a byte string. Strings and arrays of small integers are
    /// accepted too.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        if self.peek_kind()? != ValueKind::Array {
            return self.driver.decode_bytes(&mut *self.reader);
        }
        let len = self.read_array_start()?;
        let mut out = Vec::with_capacity(self.init_capacity(len));
        let mut i = 0;
        while self.has_next(len, i)? {
            self.read_array_elem(i)?;
            let b = self.read_u64()?;
            out.push(u8::try_from(b).map_err(|_| overflow(b, "u8"))?);
            i += 1;
        }
        self.read_array_end()?;
        Ok(out)
    }

    /// Read pre-encoded bytes: the exact encoding of the next value in raw
    /// mode, a byte string otherwise.
    pub fn read_raw(&mut self) -> Result<Vec<u8>, DecodeError> {
        if self.handle.basic().raw {
            self.capture_value()
        } else {
            self.read_bytes()
        }
    }

    /// Consume the next value, returning its exact encoding.
    pub(crate) fn capture_value(&mut self) -> Result<Vec<u8>, DecodeError> {
        self.driver.skip_insignificant(&mut *self.reader)?;
        self.reader.start_capture();
        let res = self.swallow();
        let raw = self.reader.end_capture();
        res.map(|_| raw)
    }

    /// Skip the next value.
    pub fn swallow(&mut self) -> Result<(), DecodeError> {
        let max = self.options().max_depth;
        let left = max.saturating_sub(self.depth);
        self.driver
            .swallow(&mut *self.reader, left)
            .map_err(|e| match e {
                DecodeError::DepthExceeded { .. } => DecodeError::DepthExceeded { max },
                other => other,
            })
    }

    /// Capacity to reserve for a declared length, capped by the handle.
    pub fn init_capacity(&self, declared: Option<usize>) -> usize {
        declared.unwrap_or(0).min(self.options().max_init_len)
    }

    // --- containers ---

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        let max = self.options().max_depth;
        if self.depth > max {
            return Err(DecodeError::DepthExceeded { max });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn read_array_start(&mut self) -> Result<Option<usize>, DecodeError> {
        self.enter()?;
        self.driver.read_array_start(&mut *self.reader)
    }

    pub fn read_array_elem(&mut self, index: usize) -> Result<(), DecodeError> {
        self.driver.read_array_elem(&mut *self.reader, index)
    }

    pub fn read_array_end(&mut self) -> Result<(), DecodeError> {
        self.driver.read_array_end(&mut *self.reader)?;
        self.leave();
        Ok(())
    }

    pub fn read_map_start(&mut self) -> Result<Option<usize>, DecodeError> {
        self.enter()?;
        self.driver.read_map_start(&mut *self.reader)
    }

    pub fn read_map_elem_key(&mut self, index: usize) -> Result<(), DecodeError> {
        self.driver.read_map_elem_key(&mut *self.reader, index)
    }

    pub fn read_map_elem_value(&mut self) -> Result<(), DecodeError> {
        self.driver.read_map_elem_value(&mut *self.reader)
    }

    pub fn read_map_end(&mut self) -> Result<(), DecodeError> {
        self.driver.read_map_end(&mut *self.reader)?;
        self.leave();
        Ok(())
    }

    /// Whether element `index` exists in a container of length `len`
    /// (`None` for indefinite).
    pub fn has_next(&mut self, len: Option<usize>, index: usize) -> Result<bool, DecodeError> {
        has_next(&mut *self.driver, &mut *self.reader, len, index)
    }

    /// Decode an array, or a byte/string stream one byte per element.
    pub fn decode_seq(&mut self, t: &mut dyn SeqTarget) -> Result<(), DecodeError> {
        match self.peek_kind()? {
            ValueKind::Array => {
                let len = self.read_array_start()?;
                t.begin(self.init_capacity(len));
                let mut i = 0;
                while self.has_next(len, i)? {
                    self.read_array_elem(i)?;
                    t.decode_elem(i, self)?;
                    i += 1;
                }
                self.read_array_end()?;
                t.finish(i)
            }
            ValueKind::Bytes | ValueKind::Str => {
                let bytes = self.driver.decode_bytes(&mut *self.reader)?;
                t.begin(self.init_capacity(Some(bytes.len())));
                for (i, &b) in bytes.iter().enumerate() {
                    self.with_value_source(Value::Uint(u64::from(b)), |d| t.decode_elem(i, d))?;
                }
                t.finish(bytes.len())
            }
            other => Err(DecodeError::mismatch("array", other)),
        }
    }

    /// Decode a map (or a flat array) into alternating key/value elements.
    pub fn decode_map_by_slice(&mut self, t: &mut dyn SeqTarget) -> Result<(), DecodeError> {
        match self.peek_kind()? {
            ValueKind::Map => {
                let len = self.read_map_start()?;
                t.begin(self.init_capacity(len.map(|n| n.saturating_mul(2))));
                let mut i = 0;
                while self.has_next(len, i)? {
                    self.read_map_elem_key(i)?;
                    t.decode_elem(2 * i, self)?;
                    self.read_map_elem_value()?;
                    t.decode_elem(2 * i + 1, self)?;
                    i += 1;
                }
                self.read_map_end()?;
                t.finish(2 * i)
            }
            ValueKind::Array => self.decode_seq(t),
            other => Err(DecodeError::mismatch("map", other)),
        }
    }

    /// Decode a map into an existing container. Entries are merged in; a
    /// null value removes the key when the handle deletes on nil.
    pub fn decode_map(&mut self, t: &mut dyn MapTarget) -> Result<(), DecodeError> {
        let kind = self.peek_kind()?;
        if kind != ValueKind::Map {
            return Err(DecodeError::mismatch("map", kind));
        }
        let len = self.read_map_start()?;
        t.begin(self.init_capacity(len));
        let mut i = 0;
        while self.has_next(len, i)? {
            self.read_map_elem_key(i)?;
            t.decode_key(self)?;
            self.read_map_elem_value()?;
            let nil = self.try_nil()?;
            t.decode_value(self, nil)?;
            i += 1;
        }
        self.read_map_end()
    }

    /// Decode a struct through its descriptor, from either a name-keyed map
    /// or a positional array.
    pub fn decode_struct(&mut self, v: &mut dyn Reflect, ti: &TypeDescriptor) -> Result<(), DecodeError> {
        match self.peek_kind()? {
            ValueKind::Map => {
                let len = self.read_map_start()?;
                let mut i = 0;
                while self.has_next(len, i)? {
                    self.read_map_elem_key(i)?;
                    let name = self.read_string()?;
                    self.read_map_elem_value()?;
                    let target = match ti.field_by_name(&name) {
                        Some(f) => resolve_field_mut(v, &f.path),
                        None if self.options().error_if_no_field => {
                            return Err(DecodeError::UnknownField {
                                type_name: ti.name,
                                name,
                            });
                        }
                        None => None,
                    };
                    match target {
                        Some(fv) => self.decode_value(fv)?,
                        None => self.swallow()?,
                    }
                    i += 1;
                }
                self.read_map_end()
            }
            ValueKind::Array => {
                let len = self.read_array_start()?;
                let mut i = 0;
                while self.has_next(len, i)? {
                    self.read_array_elem(i)?;
                    let target = match ti.fields.get(i) {
                        Some(f) => resolve_field_mut(v, &f.path),
                        None => None,
                    };
                    match target {
                        Some(fv) => self.decode_value(fv)?,
                        None => self.swallow()?,
                    }
                    i += 1;
                }
                self.read_array_end()
            }
            other => Err(DecodeError::mismatch(ti.name, other)),
        }
    }

    /// Decode into an interface slot.
    ///
    /// A concrete type mapped for the interface wins. Otherwise only the
    /// empty interface `()` decodes, using the handle's map and slice
    /// types, registered extensions, and finally a naked [`Value`].
    pub fn decode_interface(
        &mut self,
        slot: &mut Option<Box<dyn Reflect>>,
        iface: TypeId,
        iface_name: &'static str,
    ) -> Result<(), DecodeError> {
        let handle = self.handle;
        let bh = handle.basic();
        if let Some(factory) = bh.interface_impl(iface) {
            let mut obj = match slot.take() {
                Some(existing) if existing.as_any().type_id() == factory.id => existing,
                _ => factory.create(),
            };
            self.decode_value(&mut *obj)?;
            *slot = Some(obj);
            return Ok(());
        }
        if iface != TypeId::of::<()>() {
            return Err(DecodeError::NoConcreteType {
                interface: iface_name,
            });
        }
        let kind = self.peek_kind()?;
        let factory = match kind {
            ValueKind::Map => bh.map_type(),
            ValueKind::Array => bh.slice_type(),
            _ => None,
        };
        let obj = match factory {
            Some(f) => {
                let mut obj = f.create();
                self.decode_value(&mut *obj)?;
                obj
            }
            None if kind == ValueKind::Ext => self.read_ext_object()?,
            None => Box::new(self.read_dynamic()?),
        };
        *slot = Some(obj);
        Ok(())
    }

    // An extension into an empty interface: the bound type when the tag is
    // registered, else the raw extension.
    fn read_ext_object(&mut self) -> Result<Box<dyn Reflect>, DecodeError> {
        let handle = self.handle;
        let bh = handle.basic();
        let (tag, payload) = match self.driver.ext_mode() {
            ExtMode::Bytes => {
                let (tag, data) = self.driver.decode_ext_bytes(&mut *self.reader)?;
                (tag, Value::Bytes(data))
            }
            _ => {
                let tag = self.driver.decode_ext_tag(&mut *self.reader)?;
                (tag, self.read_tagged_payload()?)
            }
        };
        let ext_err = move |source| DecodeError::Extension { tag, source };
        match bh.extension_by_tag(tag) {
            Some(b) => {
                let mut obj = b.factory.create();
                match payload {
                    Value::Bytes(data) if self.driver.ext_mode() == ExtMode::Bytes => {
                        b.ext.read_ext(obj.as_any_mut(), &data).map_err(ext_err)?
                    }
                    other => b.ext.update_ext(obj.as_any_mut(), other).map_err(ext_err)?,
                }
                Ok(obj)
            }
            None => Ok(Box::new(Value::Ext(match payload {
                Value::Bytes(data) if self.driver.ext_mode() == ExtMode::Bytes => {
                    RawExt::with_data(tag, data)
                }
                other => RawExt::with_value(tag, other),
            }))),
        }
    }

    /// Read the next value with no target type.
    pub fn read_dynamic(&mut self) -> Result<Value, DecodeError> {
        Ok(match self.peek_kind()? {
            ValueKind::Nil => {
                self.try_nil()?;
                Value::Nil
            }
            ValueKind::Bool => Value::Bool(self.read_bool()?),
            ValueKind::Int | ValueKind::Uint | ValueKind::Float => self.read_number()?.into(),
            ValueKind::Str => match String::from_utf8(self.driver.decode_raw_str(&mut *self.reader)?) {
                Ok(s) => Value::Str(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            ValueKind::Bytes => Value::Bytes(self.driver.decode_bytes(&mut *self.reader)?),
            ValueKind::Array => {
                let len = self.read_array_start()?;
                let mut out = Vec::with_capacity(self.init_capacity(len));
                let mut i = 0;
                while self.has_next(len, i)? {
                    self.read_array_elem(i)?;
                    out.push(self.read_dynamic()?);
                    i += 1;
                }
                self.read_array_end()?;
                Value::Array(out)
            }
            ValueKind::Map => {
                let len = self.read_map_start()?;
                let mut out = Vec::with_capacity(self.init_capacity(len));
                let mut i = 0;
                while self.has_next(len, i)? {
                    self.read_map_elem_key(i)?;
                    let k = self.read_dynamic()?;
                    self.read_map_elem_value()?;
                    let v = self.read_dynamic()?;
                    out.push((k, v));
                    i += 1;
                }
                self.read_map_end()?;
                Value::Map(out)
            }
            ValueKind::Ext => Value::Ext(self.read_raw_ext()?),
        })
    }

    /// Read an extension value without interpreting it. Formats without
    /// ext markers yield tag 0 wrapping the next value.
    pub fn read_raw_ext(&mut self) -> Result<RawExt, DecodeError> {
        let mode = self.driver.ext_mode();
        if mode == ExtMode::Value || self.peek_kind()? != ValueKind::Ext {
            if mode == ExtMode::Value {
                return Ok(RawExt::with_value(0, self.read_dynamic()?));
            }
            return Err(DecodeError::mismatch("ext", self.peek_kind()?));
        }
        match mode {
            ExtMode::Bytes => {
                let (tag, data) = self.driver.decode_ext_bytes(&mut *self.reader)?;
                Ok(RawExt::with_data(tag, data))
            }
            _ => {
                let tag = self.driver.decode_ext_tag(&mut *self.reader)?;
                Ok(RawExt::with_value(tag, self.read_tagged_payload()?))
            }
        }
    }

    // The value under a tag head is one level deeper than the tag.
    fn read_tagged_payload(&mut self) -> Result<Value, DecodeError> {
        self.enter()?;
        let res = self.read_dynamic();
        self.leave();
        res
    }

    /// Decode a value through its own unmarshal hooks, mirroring the form
    /// the encoder picked for this handle.
    pub fn decode_self_marshal(
        &mut self,
        v: &mut dyn SelfMarshal,
        type_name: &'static str,
    ) -> Result<(), DecodeError> {
        let err = move |source| DecodeError::Marshal { type_name, source };
        if self.handle.is_binary() {
            let data = self.driver.decode_raw_str(&mut *self.reader)?;
            if let Some(r) = v.unmarshal_binary(&data) {
                return r.map_err(err);
            }
            let text = String::from_utf8(data)?;
            if let Some(r) = v.unmarshal_text(&text) {
                return r.map_err(err);
            }
        } else {
            let raw = self.capture_value()?;
            if let Some(r) = v.unmarshal_json(&raw) {
                return r.map_err(err);
            }
            let mut sub = Decoder::from_bytes(&raw, self.handle);
            if let Some(r) = v.unmarshal_text(&sub.read_string()?) {
                return r.map_err(err);
            }
            let mut sub = Decoder::from_bytes(&raw, self.handle);
            if let Some(r) = v.unmarshal_binary(&sub.read_bytes()?) {
                return r.map_err(err);
            }
        }
        Err(DecodeError::mismatch(type_name, "a value without a usable unmarshal form"))
    }
}

fn overflow(v: impl ToString, target: &'static str) -> DecodeError {
    DecodeError::Overflow {
        value: v.to_string(),
        target,
    }
}

/// Follow a flattened field path for writing, allocating null embedded
/// pointers on the way.
pub fn resolve_field_mut<'v>(root: &'v mut dyn Reflect, path: &[PathStep]) -> Option<&'v mut dyn Reflect> {
    let mut cur = root;
    for step in path {
        cur = cur.field_mut(step.index)?;
        for _ in 0..step.derefs {
            cur = cur.pointee_mut()?;
        }
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::json::JsonHandle;
    use crate::format::msgpack::MsgpackHandle;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_end_of_stream_between_values() {
        let h = MsgpackHandle::default();
        let data = [0x01u8, 0x02];
        let mut dec = Decoder::from_bytes(&data, &h);
        let mut v = 0u32;
        dec.decode(&mut v).unwrap();
        assert_eq!(v, 1);
        dec.decode(&mut v).unwrap();
        assert_eq!(v, 2);
        assert!(dec.decode(&mut v).unwrap_err().is_end_of_stream());
        assert_eq!(dec.num_read(), 2);
    }

    #[test]
    fn test_truncated_is_not_end_of_stream() {
        let h = MsgpackHandle::default();
        let data = [0x92u8, 0x01];
        let mut v: Vec<u8> = Vec::new();
        let err = Decoder::from_bytes(&data, &h).decode(&mut v).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_number_conversions() {
        let h = JsonHandle::default();
        let mut dec = Decoder::from_bytes(b"1e3 -1 2.5", &h);
        let mut i = 0i64;
        dec.decode(&mut i).unwrap();
        assert_eq!(i, 1000);
        let mut u = 0u32;
        assert!(matches!(dec.decode(&mut u), Err(DecodeError::Overflow { .. })));
        let mut n = 0i32;
        assert!(matches!(dec.decode(&mut n), Err(DecodeError::TypeMismatch { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let mut h = JsonHandle::default();
        h.basic_mut().decode.max_depth = 3;
        let mut v = Value::Nil;
        let err = Decoder::from_bytes(b"[[[[1]]]]", &h).decode(&mut v).unwrap_err();
        assert!(matches!(err, DecodeError::DepthExceeded { max: 3 }));
        Decoder::from_bytes(b"[[[1]]]", &h).decode(&mut v).unwrap();
        assert_eq!(
            v,
            Value::Array(vec![Value::Array(vec![Value::Array(vec![Value::Uint(1)])])])
        );
    }

    #[test]
    fn test_interned_strings_share() {
        let mut h = MsgpackHandle::default();
        h.basic_mut().decode.intern_string = true;
        let data = crate::codec::to_vec(&vec!["x".to_string(), "x".to_string()], &h).unwrap();
        let mut v: Vec<Arc<str>> = Vec::new();
        Decoder::from_bytes(&data, &h).decode(&mut v).unwrap();
        assert!(Arc::ptr_eq(&v[0], &v[1]));
    }
}
