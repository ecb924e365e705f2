//! Encode session: walks a value and drives one format's writer.

use std::io::Write;

use crate::codec::{EncDriver, ExtMode};
use crate::error::{EncodeError, Error};
use crate::ext::ExtensionBinding;
use crate::handle::{EncodeOptions, Handle};
use crate::reflect::{Reflect, SelfMarshal};
use crate::types::{PathStep, TypeDescriptor};
use crate::value::RawExt;

/// Encoder bound to one handle and one output.
///
/// Output is staged in an internal buffer and flushed to the writer after
/// each top-level value. A byte-mode encoder keeps everything in the buffer.
pub struct Encoder<'a> {
    handle: &'a dyn Handle,
    driver: Box<dyn EncDriver + 'a>,
    buf: Vec<u8>,
    sink: Option<Box<dyn Write + 'a>>,
    // Shared-pointer addresses on the active encode path.
    active: Vec<usize>,
}

impl<'a> Encoder<'a> {
    pub fn new<W: Write + 'a>(writer: W, handle: &'a dyn Handle) -> Self {
        Encoder {
            handle,
            driver: handle.enc_driver(),
            buf: Vec::with_capacity(256),
            sink: Some(Box::new(writer)),
            active: Vec::new(),
        }
    }

    /// Encoder that accumulates into an in-memory buffer.
    pub fn new_bytes(handle: &'a dyn Handle) -> Self {
        Encoder {
            handle,
            driver: handle.enc_driver(),
            buf: Vec::with_capacity(256),
            sink: None,
            active: Vec::new(),
        }
    }

    pub fn handle(&self) -> &'a dyn Handle {
        self.handle
    }

    pub fn options(&self) -> &'a EncodeOptions {
        let handle = self.handle;
        &handle.basic().encode
    }

    /// Encode one top-level value. On failure nothing of it is emitted.
    pub fn encode<T: Reflect>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.encode_top(|e| e.encode_value(value))
    }

    /// Encode one top-level value composed by `f` from the lower-level
    /// writers. On failure nothing of it is emitted.
    pub fn encode_top(&mut self, f: impl FnOnce(&mut Self) -> Result<(), EncodeError>) -> Result<(), EncodeError> {
        self.active.clear();
        let mark = self.buf.len();
        if let Err(e) = f(self) {
            self.buf.truncate(mark);
            self.driver.reset();
            return Err(e);
        }
        self.flush()
    }

    /// Like [`Encoder::encode`], panicking with the error as payload.
    /// Recover it with [`crate::recover`].
    pub fn must_encode<T: Reflect>(&mut self, value: &T) {
        if let Err(e) = self.encode(value) {
            std::panic::panic_any(Error::Encode(e));
        }
    }

    /// Point the encoder at a new writer, dropping buffered state.
    pub fn reset<W: Write + 'a>(&mut self, writer: W) {
        self.sink = Some(Box::new(writer));
        self.buf.clear();
        self.active.clear();
        self.driver.reset();
    }

    /// Switch to byte mode with an empty buffer.
    pub fn reset_bytes(&mut self) {
        self.sink = None;
        self.buf.clear();
        self.active.clear();
        self.driver.reset();
    }

    /// Bytes accumulated in byte mode.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    fn flush(&mut self) -> Result<(), EncodeError> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(&self.buf)?;
            sink.flush()?;
            self.buf.clear();
        }
        Ok(())
    }

    /// Encode any nested value. Extensions bound on the handle take
    /// precedence over the value's own shape.
    pub fn encode_value(&mut self, v: &dyn Reflect) -> Result<(), EncodeError> {
        let handle = self.handle;
        let bh = handle.basic();
        if bh.has_extensions() {
            if let Some(binding) = bh.extension(v.as_any().type_id()) {
                return self.encode_ext(binding, v);
            }
        }
        v.encode_with(self)
    }

    fn encode_ext(&mut self, b: &ExtensionBinding, v: &dyn Reflect) -> Result<(), EncodeError> {
        let tag = b.tag;
        let ext_err = move |source| EncodeError::Extension { tag, source };
        match self.driver.ext_mode() {
            ExtMode::Bytes => {
                let data = b.ext.write_ext(v.as_any()).map_err(ext_err)?;
                self.driver.encode_ext_bytes(&mut self.buf, tag, &data)
            }
            ExtMode::Tagged => {
                let value = b.ext.convert_ext(v.as_any()).map_err(ext_err)?;
                self.driver.encode_ext_tag(&mut self.buf, tag)?;
                self.encode_value(&value)
            }
            ExtMode::Value => {
                let value = b.ext.convert_ext(v.as_any()).map_err(ext_err)?;
                self.encode_value(&value)
            }
        }
    }

    /// Encode an extension value carried without a bound type.
    pub fn encode_raw_ext(&mut self, x: &RawExt) -> Result<(), EncodeError> {
        match self.driver.ext_mode() {
            ExtMode::Bytes => self.driver.encode_ext_bytes(&mut self.buf, x.tag, &x.data),
            ExtMode::Tagged => {
                self.driver.encode_ext_tag(&mut self.buf, x.tag)?;
                match &x.value {
                    Some(v) => self.encode_value(v.as_ref()),
                    None => self.encode_bytes(&x.data),
                }
            }
            ExtMode::Value => match &x.value {
                Some(v) => self.encode_value(v.as_ref()),
                None => self.encode_bytes(&x.data),
            },
        }
    }

    pub fn encode_nil(&mut self) -> Result<(), EncodeError> {
        self.driver.encode_nil(&mut self.buf);
        Ok(())
    }

    pub fn encode_bool(&mut self, v: bool) -> Result<(), EncodeError> {
        self.driver.encode_bool(&mut self.buf, v);
        Ok(())
    }

    pub fn encode_int(&mut self, v: i64) -> Result<(), EncodeError> {
        self.driver.encode_int(&mut self.buf, v);
        Ok(())
    }

    pub fn encode_uint(&mut self, v: u64) -> Result<(), EncodeError> {
        self.driver.encode_uint(&mut self.buf, v);
        Ok(())
    }

    pub fn encode_f32(&mut self, v: f32) -> Result<(), EncodeError> {
        self.driver.encode_f32(&mut self.buf, v);
        Ok(())
    }

    pub fn encode_f64(&mut self, v: f64) -> Result<(), EncodeError> {
        self.driver.encode_f64(&mut self.buf, v);
        Ok(())
    }

    pub fn encode_str(&mut self, v: &str) -> Result<(), EncodeError> {
        self.driver.encode_str(&mut self.buf, v);
        Ok(())
    }

    pub fn encode_bytes(&mut self, v: &[u8]) -> Result<(), EncodeError> {
        self.driver.encode_bytes(&mut self.buf, v);
        Ok(())
    }

    /// Append pre-encoded bytes as they are.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Encode [`crate::Raw`] content: verbatim in raw mode, else as bytes.
    pub fn encode_raw(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if self.handle.basic().raw {
            self.write_raw(bytes)
        } else {
            self.encode_bytes(bytes)
        }
    }

    /// Encode `len` items as an array.
    pub fn encode_seq<'v, I>(&mut self, len: usize, items: I) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = &'v dyn Reflect>,
    {
        self.write_array_start(len);
        for (i, item) in items.into_iter().enumerate() {
            self.write_array_elem(i);
            self.encode_value(item)?;
        }
        self.write_array_end();
        Ok(())
    }

    pub fn write_array_start(&mut self, len: usize) {
        self.driver.write_array_start(&mut self.buf, len);
    }

    /// Separator before element `index`.
    pub fn write_array_elem(&mut self, index: usize) {
        self.driver.write_array_elem(&mut self.buf, index == 0);
    }

    pub fn write_array_end(&mut self) {
        self.driver.write_array_end(&mut self.buf);
    }

    /// Encode `len` entries as a map. In canonical mode entries are ordered
    /// by the bytes of their encoded keys.
    pub fn encode_map<'v, I>(&mut self, len: usize, entries: I) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = (&'v dyn Reflect, &'v dyn Reflect)>,
    {
        if !self.options().canonical {
            return self.write_entries(len, entries);
        }
        let mut sorted = Vec::with_capacity(len);
        for (k, v) in entries {
            let key = self.encode_detached(|e| {
                e.driver.write_map_elem_key(&mut e.buf, true);
                e.encode_value(k)?;
                e.driver.write_map_elem_value(&mut e.buf);
                Ok(())
            })?;
            sorted.push((key, k, v));
        }
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        self.write_entries(sorted.len(), sorted.into_iter().map(|(_, k, v)| (k, v)))
    }

    fn write_entries<'v, I>(&mut self, len: usize, entries: I) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = (&'v dyn Reflect, &'v dyn Reflect)>,
    {
        self.driver.write_map_start(&mut self.buf, len);
        for (i, (k, v)) in entries.into_iter().enumerate() {
            self.driver.write_map_elem_key(&mut self.buf, i == 0);
            self.encode_value(k)?;
            self.driver.write_map_elem_value(&mut self.buf);
            self.encode_value(v)?;
        }
        self.driver.write_map_end(&mut self.buf);
        Ok(())
    }

    // Run `f` against a scratch buffer and return what it wrote.
    fn encode_detached(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), EncodeError>,
    ) -> Result<Vec<u8>, EncodeError> {
        let saved = std::mem::take(&mut self.buf);
        let res = f(self);
        let out = std::mem::replace(&mut self.buf, saved);
        res.map(|_| out)
    }

    /// Encode a sequence of alternating keys and values as a map.
    pub fn encode_map_by_slice<'v, I>(
        &mut self,
        type_name: &'static str,
        len: usize,
        items: I,
    ) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = &'v dyn Reflect>,
    {
        if len % 2 != 0 {
            return Err(EncodeError::OddMapBySlice { type_name, len });
        }
        let mut it = items.into_iter();
        let mut pairs = Vec::with_capacity(len / 2);
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            pairs.push((k, v));
        }
        self.encode_map(pairs.len(), pairs)
    }

    /// Encode a struct through its descriptor: positionally when the type
    /// or handle asks for arrays, else as a name-keyed map.
    pub fn encode_struct(&mut self, v: &dyn Reflect, ti: &TypeDescriptor) -> Result<(), EncodeError> {
        if ti.to_array || self.options().struct_to_array {
            self.driver.write_array_start(&mut self.buf, ti.fields.len());
            for (i, f) in ti.fields.iter().enumerate() {
                self.driver.write_array_elem(&mut self.buf, i == 0);
                match resolve_field(v, &f.path) {
                    Some(fv) => self.encode_value(fv)?,
                    None => self.driver.encode_nil(&mut self.buf),
                }
            }
            self.driver.write_array_end(&mut self.buf);
            return Ok(());
        }

        let mut present: Vec<_> = ti
            .fields
            .iter()
            .filter_map(|f| {
                let fv = resolve_field(v, &f.path)?;
                if f.omit_empty && fv.is_empty_value() {
                    None
                } else {
                    Some((f.name.as_str(), fv))
                }
            })
            .collect();
        if self.options().canonical {
            present.sort_by(|a, b| a.0.cmp(b.0));
        }
        self.driver.write_map_start(&mut self.buf, present.len());
        for (i, (name, fv)) in present.into_iter().enumerate() {
            self.driver.write_map_elem_key(&mut self.buf, i == 0);
            self.driver.encode_str(&mut self.buf, name);
            self.driver.write_map_elem_value(&mut self.buf);
            self.encode_value(fv)?;
        }
        self.driver.write_map_end(&mut self.buf);
        Ok(())
    }

    /// Encode the target of a shared pointer at `addr`, failing when the
    /// same allocation is already being encoded and the handle checks.
    pub fn encode_shared(&mut self, target: &dyn Reflect, addr: usize) -> Result<(), EncodeError> {
        if !self.options().check_circular_ref {
            return self.encode_value(target);
        }
        if self.active.contains(&addr) {
            return Err(EncodeError::CircularReference {
                type_name: target.type_name(),
                addr,
            });
        }
        self.active.push(addr);
        let res = self.encode_value(target);
        self.active.pop();
        res
    }

    /// Encode a value through its own marshal hooks.
    pub fn encode_self_marshal(
        &mut self,
        v: &dyn SelfMarshal,
        type_name: &'static str,
    ) -> Result<(), EncodeError> {
        let err = move |source| EncodeError::Marshal { type_name, source };
        if self.handle.is_binary() {
            if let Some(r) = v.marshal_binary() {
                return self.encode_bytes(&r.map_err(err)?);
            }
            if let Some(r) = v.marshal_text() {
                return self.encode_str(&r.map_err(err)?);
            }
        } else {
            if let Some(r) = v.marshal_json() {
                return self.write_raw(&r.map_err(err)?);
            }
            if let Some(r) = v.marshal_text() {
                return self.encode_str(&r.map_err(err)?);
            }
            if let Some(r) = v.marshal_binary() {
                return self.encode_bytes(&r.map_err(err)?);
            }
        }
        Err(EncodeError::Unsupported {
            format: self.handle.name(),
            what: format!("{} without a usable marshal form", type_name),
        })
    }
}

/// Follow a flattened field path. `None` when an embedded pointer is null.
pub fn resolve_field<'v>(root: &'v dyn Reflect, path: &[PathStep]) -> Option<&'v dyn Reflect> {
    let mut cur = root;
    for step in path {
        cur = cur.field(step.index)?;
        for _ in 0..step.derefs {
            cur = cur.pointee()?;
        }
    }
    Some(cur)
}
