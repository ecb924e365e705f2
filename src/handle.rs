//! Handles: one wire format plus the options shared by every format.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::{DecDriver, EncDriver};
use crate::error::ConfigError;
use crate::ext::{Extension, ExtensionBinding, ExtensionRegistry};
use crate::reflect::{Codec, Reflect};
use crate::types::{type_info, Kind};

/// Default cap, in elements, on capacity reserved from a length prefix.
pub const DEFAULT_MAX_INIT_LEN: usize = 16 * 1024;

/// Default limit on container nesting while decoding.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// A wire format. Configure through `basic_mut`, then share by reference.
pub trait Handle: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_binary(&self) -> bool;
    fn basic(&self) -> &BasicHandle;
    fn basic_mut(&mut self) -> &mut BasicHandle;
    fn enc_driver(&self) -> Box<dyn EncDriver + '_>;
    fn dec_driver(&self) -> Box<dyn DecDriver + '_>;
}

/// Encode-side options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EncodeOptions {
    /// Sort map entries into a deterministic order.
    pub canonical: bool,
    /// Encode every struct positionally.
    pub struct_to_array: bool,
    /// Fail when a shared pointer repeats on the active path.
    pub check_circular_ref: bool,
}

/// Decode-side options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecodeOptions {
    /// Most elements reserved up front from a length prefix.
    pub max_init_len: usize,
    /// Deepest container nesting accepted.
    pub max_depth: usize,
    /// Remove the key when a map value decodes from null.
    pub delete_on_nil_map_value: bool,
    /// Share equal `Arc<str>` values decoded by one session.
    pub intern_string: bool,
    /// Fail on a map key that names no struct field.
    pub error_if_no_field: bool,
    /// Fail when a fixed-size array receives too many elements.
    pub error_if_no_array_expand: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            max_init_len: DEFAULT_MAX_INIT_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            delete_on_nil_map_value: false,
            intern_string: false,
            error_if_no_field: false,
            error_if_no_array_expand: true,
        }
    }
}

/// Constructor for a concrete type chosen at runtime.
#[derive(Clone, Copy)]
pub struct TypeFactory {
    pub name: &'static str,
    pub id: TypeId,
    make: fn() -> Box<dyn Reflect>,
}

fn make_default<T: Reflect + Default>() -> Box<dyn Reflect> {
    Box::new(T::default())
}

impl TypeFactory {
    pub fn of<T: Codec + Default>() -> Self {
        TypeFactory {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
            make: make_default::<T>,
        }
    }

    pub fn create(&self) -> Box<dyn Reflect> {
        (self.make)()
    }
}

impl fmt::Debug for TypeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Options and registries shared by every handle.
#[derive(Clone, Default, Debug)]
pub struct BasicHandle {
    pub encode: EncodeOptions,
    pub decode: DecodeOptions,
    /// Pass `Raw` values through verbatim.
    pub raw: bool,
    map_type: Option<TypeFactory>,
    slice_type: Option<TypeFactory>,
    extensions: ExtensionRegistry,
    interfaces: HashMap<TypeId, TypeFactory>,
}

impl BasicHandle {
    /// Container used for map streams decoded into an empty interface.
    pub fn set_map_type<T: Codec + Default>(&mut self) -> Result<(), ConfigError> {
        match type_info::<T>().kind {
            Kind::Map(..) | Kind::MapBySlice(_) => {
                self.map_type = Some(TypeFactory::of::<T>());
                Ok(())
            }
            _ => Err(ConfigError::NotAMapType {
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    /// Container used for array streams decoded into an empty interface.
    pub fn set_slice_type<T: Codec + Default>(&mut self) -> Result<(), ConfigError> {
        match type_info::<T>().kind {
            Kind::Seq(_) | Kind::Array(..) => {
                self.slice_type = Some(TypeFactory::of::<T>());
                Ok(())
            }
            _ => Err(ConfigError::NotASliceType {
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    pub fn clear_map_type(&mut self) {
        self.map_type = None;
    }

    pub fn clear_slice_type(&mut self) {
        self.slice_type = None;
    }

    pub fn map_type(&self) -> Option<&TypeFactory> {
        self.map_type.as_ref()
    }

    pub fn slice_type(&self) -> Option<&TypeFactory> {
        self.slice_type.as_ref()
    }

    /// Bind `T` to an extension under `tag`.
    pub fn set_extension<T: Codec + Default>(
        &mut self,
        tag: u64,
        ext: impl Extension + 'static,
    ) -> Result<(), ConfigError> {
        self.extensions.set::<T>(tag, Arc::new(ext))
    }

    /// Remove the extension bound to `T`. Returns whether one existed.
    pub fn remove_extension<T: 'static>(&mut self) -> bool {
        self.extensions.remove::<T>()
    }

    pub fn extension(&self, id: TypeId) -> Option<&ExtensionBinding> {
        self.extensions.get(id)
    }

    pub fn extension_by_tag(&self, tag: u64) -> Option<&ExtensionBinding> {
        self.extensions.get_by_tag(tag)
    }

    pub(crate) fn has_extensions(&self) -> bool {
        !self.extensions.is_empty()
    }

    /// Materialise `C` when decoding into an `Interface<K>`.
    pub fn map_interface<K: ?Sized + 'static, C: Codec + Default>(&mut self) {
        log::debug!(
            "[handle] interface {} maps to {}",
            std::any::type_name::<K>(),
            std::any::type_name::<C>()
        );
        self.interfaces
            .insert(TypeId::of::<K>(), TypeFactory::of::<C>());
    }

    pub fn unmap_interface<K: ?Sized + 'static>(&mut self) -> bool {
        self.interfaces.remove(&TypeId::of::<K>()).is_some()
    }

    pub fn interface_impl(&self, iface: TypeId) -> Option<&TypeFactory> {
        self.interfaces.get(&iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let bh = BasicHandle::default();
        assert_eq!(bh.decode.max_init_len, DEFAULT_MAX_INIT_LEN);
        assert!(bh.decode.error_if_no_array_expand);
        assert!(!bh.encode.canonical);
        assert!(!bh.raw);
    }

    #[test]
    fn test_container_types_are_checked() {
        let mut bh = BasicHandle::default();
        assert!(bh.set_map_type::<HashMap<String, String>>().is_ok());
        assert!(bh.set_slice_type::<Vec<String>>().is_ok());
        assert!(matches!(
            bh.set_map_type::<Vec<String>>(),
            Err(ConfigError::NotAMapType { .. })
        ));
        assert!(matches!(
            bh.set_slice_type::<i32>(),
            Err(ConfigError::NotASliceType { .. })
        ));
        assert_eq!(
            bh.map_type().map(|f| f.id),
            Some(TypeId::of::<HashMap<String, String>>())
        );
    }
}
