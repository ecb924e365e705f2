//! Extension registry: per-handle custom encodings keyed by Rust type.
//!
//! An extension turns a value into either opaque bytes (`write_ext` /
//! `read_ext`, used by byte-oriented formats) or another dynamic value
//! (`convert_ext` / `update_ext`, used by CBOR and JSON). The walker checks
//! the registry by exact `TypeId` before looking at the value's shape.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ExtError};
use crate::handle::TypeFactory;
use crate::reflect::Codec;
use crate::value::Value;

/// Custom encode/decode functions for one type.
///
/// Implement the byte pair, the value pair, or both. The defaults bridge
/// the value pair onto the byte pair through `Value::Bytes`.
pub trait Extension: Send + Sync {
    fn write_ext(&self, _v: &dyn Any) -> Result<Vec<u8>, ExtError> {
        Err(ExtError::new("extension has no byte form"))
    }

    fn read_ext(&self, _dst: &mut dyn Any, _data: &[u8]) -> Result<(), ExtError> {
        Err(ExtError::new("extension has no byte form"))
    }

    fn convert_ext(&self, v: &dyn Any) -> Result<Value, ExtError> {
        Ok(Value::Bytes(self.write_ext(v)?))
    }

    fn update_ext(&self, dst: &mut dyn Any, v: Value) -> Result<(), ExtError> {
        match v {
            Value::Bytes(b) => self.read_ext(dst, &b),
            Value::Str(s) => self.read_ext(dst, s.as_bytes()),
            other => Err(ExtError::new(format!(
                "unsupported format for extension: {}",
                other.type_name()
            ))),
        }
    }
}

/// A type bound to a tag and its extension functions.
#[derive(Clone)]
pub struct ExtensionBinding {
    pub tag: u64,
    pub type_name: &'static str,
    pub ext: Arc<dyn Extension>,
    pub(crate) factory: TypeFactory,
}

impl fmt::Debug for ExtensionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionBinding")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// All bindings of one handle.
#[derive(Clone, Default, Debug)]
pub struct ExtensionRegistry {
    by_type: HashMap<TypeId, ExtensionBinding>,
    by_tag: HashMap<u64, TypeId>,
}

impl ExtensionRegistry {
    /// Bind `T` to `tag`, replacing any earlier binding of `T`.
    pub fn set<T: Codec + Default>(
        &mut self,
        tag: u64,
        ext: Arc<dyn Extension>,
    ) -> Result<(), ConfigError> {
        let id = TypeId::of::<T>();
        if let Some(other) = self.by_tag.get(&tag).filter(|&&other| other != id) {
            return Err(ConfigError::TagConflict {
                tag,
                existing: self.by_type[other].type_name,
            });
        }
        let binding = ExtensionBinding {
            tag,
            type_name: std::any::type_name::<T>(),
            ext,
            factory: TypeFactory::of::<T>(),
        };
        if let Some(old) = self.by_type.insert(id, binding) {
            log::debug!(
                "[ext] replacing binding of {} (tag {} -> {})",
                old.type_name,
                old.tag,
                tag
            );
            self.by_tag.remove(&old.tag);
        } else {
            log::debug!("[ext] bound {} to tag {}", std::any::type_name::<T>(), tag);
        }
        self.by_tag.insert(tag, id);
        Ok(())
    }

    /// Drop the binding of `T`. Returns whether one existed.
    pub fn remove<T: 'static>(&mut self) -> bool {
        match self.by_type.remove(&TypeId::of::<T>()) {
            Some(old) => {
                log::debug!("[ext] removed binding of {} (tag {})", old.type_name, old.tag);
                self.by_tag.remove(&old.tag);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&ExtensionBinding> {
        self.by_type.get(&id)
    }

    pub fn get_by_tag(&self, tag: u64) -> Option<&ExtensionBinding> {
        self.by_tag.get(&tag).and_then(|id| self.by_type.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Extension for Noop {}

    #[test]
    fn test_conflicting_tag_is_rejected() {
        let mut reg = ExtensionRegistry::default();
        reg.set::<u32>(7, Arc::new(Noop)).unwrap();
        let err = reg.set::<u64>(7, Arc::new(Noop)).unwrap_err();
        assert!(matches!(err, ConfigError::TagConflict { tag: 7, .. }));
    }

    #[test]
    fn test_rebinding_replaces() {
        let mut reg = ExtensionRegistry::default();
        reg.set::<u32>(7, Arc::new(Noop)).unwrap();
        reg.set::<u32>(8, Arc::new(Noop)).unwrap();
        assert!(reg.get_by_tag(7).is_none());
        assert_eq!(reg.get(TypeId::of::<u32>()).map(|b| b.tag), Some(8));
        // The old tag is free again.
        reg.set::<u64>(7, Arc::new(Noop)).unwrap();
        assert!(reg.remove::<u32>());
        assert!(!reg.remove::<u32>());
        assert!(reg.get_by_tag(8).is_none());
    }

    #[test]
    fn test_default_update_rejects_non_bytes() {
        let mut dst = 0u32;
        let err = Noop.update_ext(&mut dst, Value::Int(1)).unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }
}
