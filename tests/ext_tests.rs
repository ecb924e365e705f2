//! Extensions, interfaces, self-marshaling types, channels and shared
//! pointers.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use polycodec::{
    from_slice, recover, to_vec, BincHandle, CborHandle, Chan, Codec, ConfigError, DecodeError, EncodeError,
    Encoder, Error, ExtError, Extension, Handle, Interface, JsonHandle, MsgpackHandle, RawExt, SelfMarshal,
    SimpleHandle, Value,
};
use pretty_assertions::assert_eq;

#[derive(Codec, Debug, Default, Clone, PartialEq)]
struct Timestamp {
    secs: i64,
}

struct TimestampExt;

impl Extension for TimestampExt {
    fn write_ext(&self, v: &dyn Any) -> Result<Vec<u8>, ExtError> {
        let ts = v
            .downcast_ref::<Timestamp>()
            .ok_or_else(|| ExtError::new("not a Timestamp"))?;
        Ok(ts.secs.to_be_bytes().to_vec())
    }

    fn read_ext(&self, dst: &mut dyn Any, data: &[u8]) -> Result<(), ExtError> {
        let ts = dst
            .downcast_mut::<Timestamp>()
            .ok_or_else(|| ExtError::new("not a Timestamp"))?;
        let raw: [u8; 8] = data
            .try_into()
            .map_err(|_| ExtError::new(format!("want 8 bytes, got {}", data.len())))?;
        ts.secs = i64::from_be_bytes(raw);
        Ok(())
    }

    fn convert_ext(&self, v: &dyn Any) -> Result<Value, ExtError> {
        let ts = v
            .downcast_ref::<Timestamp>()
            .ok_or_else(|| ExtError::new("not a Timestamp"))?;
        Ok(Value::Int(ts.secs))
    }

    fn update_ext(&self, dst: &mut dyn Any, v: Value) -> Result<(), ExtError> {
        let ts = dst
            .downcast_mut::<Timestamp>()
            .ok_or_else(|| ExtError::new("not a Timestamp"))?;
        ts.secs = v
            .as_i64()
            .ok_or_else(|| ExtError::new(format!("want an integer, got {}", v.type_name())))?;
        Ok(())
    }
}

#[derive(Codec, Debug, Default, PartialEq)]
struct Event {
    name: String,
    at: Timestamp,
    seen: Vec<Timestamp>,
}

fn with_ext(mut h: Box<dyn Handle>) -> Box<dyn Handle> {
    h.basic_mut().set_extension::<Timestamp>(1, TimestampExt).unwrap();
    h
}

#[test]
fn test_extension_roundtrip_every_handle() {
    let ev = Event {
        name: "launch".into(),
        at: Timestamp { secs: 1_700_000_000 },
        seen: vec![Timestamp { secs: -1 }, Timestamp { secs: 0 }],
    };
    let handles: Vec<Box<dyn Handle>> = vec![
        with_ext(Box::new(MsgpackHandle::default())),
        with_ext(Box::new(BincHandle::default())),
        with_ext(Box::new(SimpleHandle::default())),
        with_ext(Box::new(CborHandle::default())),
        with_ext(Box::new(JsonHandle::default())),
    ];
    for h in handles {
        let bytes = to_vec(&ev, h.as_ref()).unwrap();
        let back: Event = from_slice(&bytes, h.as_ref()).unwrap();
        assert_eq!(back, ev, "handle {}", h.name());
    }
}

#[test]
fn test_extension_wire_forms() {
    let ts = Timestamp { secs: 2 };

    let mut mp = MsgpackHandle::default();
    mp.basic_mut().set_extension::<Timestamp>(1, TimestampExt).unwrap();
    assert_eq!(to_vec(&ts, &mp).unwrap(), vec![0xd7, 0x01, 0, 0, 0, 0, 0, 0, 0, 2]);

    let mut cbor = CborHandle::default();
    cbor.basic_mut().set_extension::<Timestamp>(1, TimestampExt).unwrap();
    assert_eq!(to_vec(&ts, &cbor).unwrap(), vec![0xc1, 0x02]);

    let mut json = JsonHandle::default();
    json.basic_mut().set_extension::<Timestamp>(1, TimestampExt).unwrap();
    assert_eq!(to_vec(&ts, &json).unwrap(), b"2".to_vec());

    // Without the binding the struct shape is used.
    assert!(json.basic_mut().remove_extension::<Timestamp>());
    assert!(!json.basic_mut().remove_extension::<Timestamp>());
    assert_eq!(to_vec(&ts, &json).unwrap(), br#"{"secs":2}"#.to_vec());
}

#[test]
fn test_extension_tag_conflict() {
    #[derive(Codec, Default)]
    struct Other {
        x: u8,
    }

    let mut h = MsgpackHandle::default();
    h.basic_mut().set_extension::<Timestamp>(1, TimestampExt).unwrap();
    assert!(matches!(
        h.basic_mut().set_extension::<Other>(1, TimestampExt),
        Err(ConfigError::TagConflict { tag: 1, .. })
    ));
    // Rebinding the same type under a new tag is a replacement.
    h.basic_mut().set_extension::<Timestamp>(2, TimestampExt).unwrap();
    assert_eq!(h.basic().extension_by_tag(2).map(|b| b.tag), Some(2));
    assert!(h.basic().extension_by_tag(1).is_none());
}

#[test]
fn test_extension_errors_surface() {
    let mut h = MsgpackHandle::default();
    h.basic_mut().set_extension::<Timestamp>(1, TimestampExt).unwrap();
    // Tag 1 with three bytes of payload.
    let data = [0xc7, 0x03, 0x01, 1, 2, 3];
    assert!(matches!(
        from_slice::<Timestamp>(&data, &h),
        Err(DecodeError::Extension { tag: 1, .. })
    ));
    // A different tag on the wire.
    let data = [0xd7, 0x09, 0, 0, 0, 0, 0, 0, 0, 1];
    assert!(matches!(
        from_slice::<Timestamp>(&data, &h),
        Err(DecodeError::Extension { tag: 1, .. })
    ));
}

#[test]
fn test_unknown_ext_decodes_to_raw_ext() {
    let h = MsgpackHandle::default();
    let raw = RawExt::with_data(5, vec![1, 2, 3]);
    let bytes = to_vec(&raw, &h).unwrap();
    assert_eq!(bytes, vec![0xc7, 0x03, 0x05, 1, 2, 3]);

    let v: Value = from_slice(&bytes, &h).unwrap();
    assert_eq!(v, Value::Ext(raw.clone()));
    let back: RawExt = from_slice(&bytes, &h).unwrap();
    assert_eq!(back, raw);

    let cbor = CborHandle::default();
    let tagged = RawExt::with_value(100, Value::Str("x".into()));
    let bytes = to_vec(&tagged, &cbor).unwrap();
    assert_eq!(bytes, vec![0xd8, 0x64, 0x61, b'x']);
    assert_eq!(from_slice::<RawExt>(&bytes, &cbor).unwrap(), tagged);
}

#[test]
fn test_ext_into_empty_interface() {
    let mut h = BincHandle::default();
    h.basic_mut().set_extension::<Timestamp>(7, TimestampExt).unwrap();
    let bytes = to_vec(&Timestamp { secs: 42 }, &h).unwrap();
    let slot: Interface = from_slice(&bytes, &h).unwrap();
    assert_eq!(slot.downcast_ref::<Timestamp>(), Some(&Timestamp { secs: 42 }));
}

trait Shape {}

#[derive(Codec, Debug, Default, PartialEq)]
struct Circle {
    radius: f64,
}

#[derive(Codec, Debug, Default)]
struct Drawing {
    title: String,
    shape: Interface<dyn Shape>,
    extra: Interface,
}

#[test]
fn test_interface_mapping() {
    let mut h = CborHandle::default();
    let d = Drawing {
        title: "c".into(),
        shape: Interface::new(Circle { radius: 1.5 }),
        extra: Interface::new(vec![1u8, 2]),
    };
    let bytes = to_vec(&d, &h).unwrap();

    assert!(matches!(
        from_slice::<Drawing>(&bytes, &h),
        Err(DecodeError::NoConcreteType { .. })
    ));

    h.basic_mut().map_interface::<dyn Shape, Circle>();
    let back: Drawing = from_slice(&bytes, &h).unwrap();
    assert_eq!(back.title, "c");
    assert_eq!(back.shape.downcast_ref::<Circle>(), Some(&Circle { radius: 1.5 }));
    // The empty interface takes whatever the stream holds.
    assert_eq!(back.extra.as_value(), Some(&Value::Bytes(vec![1, 2])));
}

#[test]
fn test_interface_keeps_matching_instance() {
    let mut h = JsonHandle::default();
    h.basic_mut().map_interface::<dyn Shape, Circle>();
    let mut d = Drawing::default();
    d.shape.set(Circle { radius: 9.0 });
    polycodec::decode_into(br#"{"shape":{}}"#, &h, &mut d).unwrap();
    // An empty object merges into the existing circle.
    assert_eq!(d.shape.downcast_ref::<Circle>(), Some(&Circle { radius: 9.0 }));
}

#[test]
fn test_empty_interface_container_types() {
    let mut h = MsgpackHandle::default();
    let mut m = BTreeMap::new();
    m.insert("a".to_string(), Value::Uint(1));
    let bytes = to_vec(&m, &h).unwrap();

    let plain: Interface = from_slice(&bytes, &h).unwrap();
    assert!(plain.as_value().is_some());

    h.basic_mut().set_map_type::<BTreeMap<String, Value>>().unwrap();
    let typed: Interface = from_slice(&bytes, &h).unwrap();
    assert_eq!(typed.downcast_ref::<BTreeMap<String, Value>>(), Some(&m));

    h.basic_mut().set_slice_type::<Vec<String>>().unwrap();
    let list: Interface = from_slice(&to_vec(&vec!["x".to_string()], &h).unwrap(), &h).unwrap();
    assert_eq!(list.downcast_ref::<Vec<String>>(), Some(&vec!["x".to_string()]));
}

#[derive(Codec, Debug, Default, PartialEq)]
#[codec(self_marshal)]
struct Version {
    major: u32,
    minor: u32,
}

impl SelfMarshal for Version {
    fn marshal_text(&self) -> Option<Result<String, ExtError>> {
        Some(Ok(format!("{}.{}", self.major, self.minor)))
    }

    fn unmarshal_text(&mut self, text: &str) -> Option<Result<(), ExtError>> {
        let mut parse = || -> Result<(), ExtError> {
            let (major, minor) = text
                .split_once('.')
                .ok_or_else(|| ExtError::new(format!("bad version {:?}", text)))?;
            self.major = major.parse().map_err(|_| ExtError::new("bad major"))?;
            self.minor = minor.parse().map_err(|_| ExtError::new("bad minor"))?;
            Ok(())
        };
        Some(parse())
    }
}

#[derive(Codec, Debug, Default, PartialEq)]
#[codec(self_marshal)]
struct Opaque {
    bits: Vec<u8>,
}

impl SelfMarshal for Opaque {
    fn marshal_binary(&self) -> Option<Result<Vec<u8>, ExtError>> {
        Some(Ok(self.bits.iter().rev().copied().collect()))
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Option<Result<(), ExtError>> {
        self.bits = data.iter().rev().copied().collect();
        Some(Ok(()))
    }

    fn marshal_json(&self) -> Option<Result<Vec<u8>, ExtError>> {
        Some(Ok(format!("{{\"n\":{}}}", self.bits.len()).into_bytes()))
    }

    fn unmarshal_json(&mut self, json: &[u8]) -> Option<Result<(), ExtError>> {
        let text = String::from_utf8_lossy(json);
        let n: usize = match text.trim_start_matches("{\"n\":").trim_end_matches('}').parse() {
            Ok(n) => n,
            Err(_) => return Some(Err(ExtError::new("bad json"))),
        };
        self.bits = vec![0; n];
        Some(Ok(()))
    }
}

#[test]
fn test_self_marshal_text() {
    let v = Version { major: 1, minor: 12 };
    let json = JsonHandle::default();
    assert_eq!(to_vec(&v, &json).unwrap(), br#""1.12""#.to_vec());
    assert_eq!(from_slice::<Version>(br#""3.4""#, &json).unwrap(), Version { major: 3, minor: 4 });

    let mp = MsgpackHandle::default();
    let bytes = to_vec(&v, &mp).unwrap();
    assert_eq!(bytes, vec![0xa4, b'1', b'.', b'1', b'2']);
    assert_eq!(from_slice::<Version>(&bytes, &mp).unwrap(), v);

    assert!(matches!(
        from_slice::<Version>(br#""nope""#, &json),
        Err(DecodeError::Marshal { .. })
    ));
}

#[test]
fn test_self_marshal_binary_and_json() {
    let v = Opaque { bits: vec![1, 2, 3] };
    let cbor = CborHandle::default();
    let bytes = to_vec(&v, &cbor).unwrap();
    assert_eq!(bytes, vec![0x43, 3, 2, 1]);
    assert_eq!(from_slice::<Opaque>(&bytes, &cbor).unwrap(), v);

    // JSON output is spliced verbatim.
    let json = JsonHandle::default();
    #[derive(Codec, Default)]
    struct Wrap {
        o: Opaque,
    }
    let w = Wrap { o: Opaque { bits: vec![7, 7] } };
    assert_eq!(to_vec(&w, &json).unwrap(), br#"{"o":{"n":2}}"#.to_vec());
    let back: Opaque = from_slice(br#"{"n":4}"#, &json).unwrap();
    assert_eq!(back.bits, vec![0; 4]);
}

#[derive(Codec, Default)]
struct Mailbox {
    owner: String,
    queue: Chan<String>,
}

#[test]
fn test_chan_field() {
    let h = SimpleHandle::default();
    let mb = Mailbox::default();
    mb.queue.sender().send("one".into()).unwrap();
    mb.queue.sender().send("two".into()).unwrap();
    let bytes = to_vec(&mb, &h).unwrap();
    // Encoding drains what was buffered.
    assert!(mb.queue.is_empty());

    let back: Mailbox = from_slice(&bytes, &h).unwrap();
    let got: Vec<String> = back.queue.receiver().try_iter().collect();
    assert_eq!(got, vec!["one".to_string(), "two".to_string()]);
}

#[derive(Codec, Debug, Default)]
struct Node {
    name: String,
    next: Option<Rc<RefCell<Node>>>,
}

fn cycle() -> (Rc<RefCell<Node>>, Rc<RefCell<Node>>) {
    let a = Rc::new(RefCell::new(Node {
        name: "a".into(),
        next: None,
    }));
    let b = Rc::new(RefCell::new(Node {
        name: "b".into(),
        next: Some(a.clone()),
    }));
    a.borrow_mut().next = Some(b.clone());
    (a, b)
}

#[test]
fn test_circular_reference_rejected() {
    let mut h = MsgpackHandle::default();
    h.basic_mut().encode.check_circular_ref = true;
    let (a, b) = cycle();
    let err = to_vec(&a, &h).unwrap_err();
    assert!(matches!(err, EncodeError::CircularReference { .. }), "{:?}", err);

    // must_encode panics with the error; recover gets it back.
    let mut enc = Encoder::new_bytes(&h);
    let res = recover(|| enc.must_encode(&a));
    assert!(matches!(res, Err(Error::Encode(EncodeError::CircularReference { .. }))));

    b.borrow_mut().next = None;
}

#[test]
fn test_shared_without_cycle_is_fine() {
    let mut h = MsgpackHandle::default();
    h.basic_mut().encode.check_circular_ref = true;
    let leaf = Rc::new(RefCell::new(Node {
        name: "leaf".into(),
        next: None,
    }));
    // The same pointer twice, side by side, is not a cycle.
    let pair = vec![Some(leaf.clone()), Some(leaf)];
    let bytes = to_vec(&pair, &h).unwrap();
    let back: Vec<Option<Rc<RefCell<Node>>>> = from_slice(&bytes, &h).unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[1].as_ref().map(|n| n.borrow().name.clone()), Some("leaf".to_string()));
}
