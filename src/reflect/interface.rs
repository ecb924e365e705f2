use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::reflect::{Codec, Reflect};
use crate::types::{Describe, Shape};
use crate::value::Value;

/// A slot holding any codec value, chosen at decode time.
///
/// `K` names the interface. The default `()` is the empty interface: any
/// stream value decodes into it (see [`crate::BasicHandle::set_map_type`]).
/// Any other `K` needs a concrete type registered with
/// [`crate::BasicHandle::map_interface`].
pub struct Interface<K: ?Sized + 'static = ()> {
    inner: Option<Box<dyn Reflect>>,
    _marker: PhantomData<fn() -> *const K>,
}

impl<K: ?Sized + 'static> Interface<K> {
    pub fn nil() -> Self {
        Interface {
            inner: None,
            _marker: PhantomData,
        }
    }

    pub fn new<T: Codec>(value: T) -> Self {
        Interface {
            inner: Some(Box::new(value)),
            _marker: PhantomData,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.inner.is_none()
    }

    pub fn get(&self) -> Option<&dyn Reflect> {
        self.inner.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        match &mut self.inner {
            Some(v) => Some(&mut **v),
            None => None,
        }
    }

    pub fn set<T: Codec>(&mut self, value: T) {
        self.inner = Some(Box::new(value));
    }

    pub fn take(&mut self) -> Option<Box<dyn Reflect>> {
        self.inner.take()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_ref()?.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.inner.as_mut()?.as_any_mut().downcast_mut()
    }

    /// The held value when it decoded as a dynamic [`Value`].
    pub fn as_value(&self) -> Option<&Value> {
        self.downcast_ref()
    }
}

impl<K: ?Sized + 'static> Default for Interface<K> {
    fn default() -> Self {
        Interface::nil()
    }
}

impl<K: ?Sized + 'static> fmt::Debug for Interface<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Interface(nil)"),
            Some(v) => match v.as_any().downcast_ref::<Value>() {
                Some(value) => write!(f, "Interface({:?})", value),
                None => write!(f, "Interface(<{}>)", v.type_name()),
            },
        }
    }
}

impl<K: ?Sized + 'static> Describe for Interface<K> {
    fn shape() -> Shape {
        Shape::Interface(std::any::type_name::<K>())
    }
}

impl<K: ?Sized + 'static> Reflect for Interface<K> {
    fn encode_with(&self, e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        match &self.inner {
            Some(v) => e.encode_value(&**v),
            None => e.encode_nil(),
        }
    }

    fn decode_with(&mut self, d: &mut Decoder<'_>) -> Result<(), DecodeError> {
        d.decode_interface(&mut self.inner, TypeId::of::<K>(), std::any::type_name::<K>())
    }

    fn is_empty_value(&self) -> bool {
        self.inner.is_none()
    }

    fn reset_zero(&mut self) {
        self.inner = None;
    }

    crate::reflect_any!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_slice, to_vec};
    use crate::format::msgpack::MsgpackHandle;
    use crate::handle::Handle;
    use pretty_assertions::assert_eq;

    trait Shape2D {}

    #[test]
    fn test_empty_interface_decodes_value() {
        let h = MsgpackHandle::default();
        let b = to_vec(&Interface::<()>::new(7u32), &h).unwrap();
        let back: Interface = from_slice(&b, &h).unwrap();
        assert_eq!(back.as_value(), Some(&Value::Uint(7)));
    }

    #[test]
    fn test_named_interface_needs_mapping() {
        let mut h = MsgpackHandle::default();
        let b = to_vec(&5u32, &h).unwrap();
        let err = from_slice::<Interface<dyn Shape2D>>(&b, &h).unwrap_err();
        assert!(matches!(err, DecodeError::NoConcreteType { .. }));

        h.basic_mut().map_interface::<dyn Shape2D, u64>();
        let back: Interface<dyn Shape2D> = from_slice(&b, &h).unwrap();
        assert_eq!(back.downcast_ref::<u64>(), Some(&5));
    }

    #[test]
    fn test_nil_roundtrip() {
        let h = MsgpackHandle::default();
        let b = to_vec(&Interface::<()>::nil(), &h).unwrap();
        assert_eq!(b, vec![0xc0]);
        let back: Interface = from_slice(&b, &h).unwrap();
        assert!(back.is_nil());
    }
}
