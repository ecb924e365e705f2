//! Round trips of typed and dynamic values through every handle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use polycodec::{
    from_slice, to_vec, BasicHandle, BincHandle, CborHandle, Codec, Decoder, Encoder, Handle, JsonHandle,
    MsgpackHandle, SimpleHandle, Value,
};
use pretty_assertions::assert_eq;

fn handles_with(configure: impl Fn(&mut BasicHandle)) -> Vec<Box<dyn Handle>> {
    let mut msgpack_ext = MsgpackHandle::default();
    msgpack_ext.write_ext = true;
    let mut cbor_indefinite = CborHandle::default();
    cbor_indefinite.indefinite_length = true;
    let mut json_indent = JsonHandle::default();
    json_indent.indent = 2;

    let mut out: Vec<Box<dyn Handle>> = vec![
        Box::new(MsgpackHandle::default()),
        Box::new(msgpack_ext),
        Box::new(BincHandle::default()),
        Box::new(SimpleHandle::default()),
        Box::new(CborHandle::default()),
        Box::new(cbor_indefinite),
        Box::new(JsonHandle::default()),
        Box::new(json_indent),
    ];
    for h in out.iter_mut() {
        configure(h.basic_mut());
    }
    out
}

fn handles() -> Vec<Box<dyn Handle>> {
    handles_with(|_| {})
}

#[derive(Codec, Debug, Default, Clone, PartialEq)]
struct Address {
    street: String,
    zip: u32,
}

#[derive(Codec, Debug, Default, Clone, PartialEq)]
struct Everything {
    flag: bool,
    small: i8,
    neg: i64,
    big: u64,
    ratio: f64,
    single: f32,
    letter: char,
    name: String,
    blob: Vec<u8>,
    list: Vec<i32>,
    fixed: [u16; 3],
    lookup: BTreeMap<String, Vec<String>>,
    by_id: HashMap<u32, Address>,
    home: Address,
    work: Option<Address>,
    nothing: Option<String>,
    boxed: Box<Address>,
    shared: Arc<Address>,
    dynamic: Value,
}

fn sample() -> Everything {
    let mut lookup = BTreeMap::new();
    lookup.insert("a".to_string(), vec!["x".to_string(), "y".to_string()]);
    lookup.insert("empty".to_string(), Vec::new());
    let mut by_id = HashMap::new();
    by_id.insert(
        7,
        Address {
            street: "Elm".into(),
            zip: 12345,
        },
    );
    Everything {
        flag: true,
        small: -128,
        neg: -9_000_000_000,
        big: u64::MAX,
        ratio: -2.5,
        single: 0.25,
        letter: 'é',
        name: "unicode \u{1f600} and \"quotes\"".into(),
        blob: vec![0, 1, 2, 253, 254, 255],
        list: vec![i32::MIN, -1, 0, 1, i32::MAX],
        fixed: [1, 300, 65535],
        lookup,
        by_id,
        home: Address {
            street: "Main".into(),
            zip: 1,
        },
        work: Some(Address {
            street: "Dock".into(),
            zip: 99,
        }),
        nothing: None,
        boxed: Box::new(Address {
            street: "Box".into(),
            zip: 2,
        }),
        shared: Arc::new(Address {
            street: "Arc".into(),
            zip: 3,
        }),
        dynamic: Value::Array(vec![Value::Bool(false), Value::Str("s".into()), Value::Nil]),
    }
}

#[test]
fn test_struct_roundtrip_every_handle() {
    let v = sample();
    for h in handles() {
        let bytes = to_vec(&v, h.as_ref()).unwrap();
        let back: Everything = from_slice(&bytes, h.as_ref())
            .unwrap_or_else(|e| panic!("{}: {}", h.name(), e));
        assert_eq!(back, v, "handle {}", h.name());
    }
}

#[test]
fn test_struct_to_array_roundtrip() {
    let v = sample();
    for h in handles_with(|b| b.encode.struct_to_array = true) {
        let bytes = to_vec(&v, h.as_ref()).unwrap();
        let back: Everything = from_slice(&bytes, h.as_ref()).unwrap();
        assert_eq!(back, v, "handle {}", h.name());
    }
}

#[test]
fn test_canonical_is_deterministic() {
    // Separate maps iterate in different orders.
    let build = |keys: &[&str]| -> HashMap<String, u32> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| (k.to_string(), (k.len() + i) as u32))
            .collect()
    };
    let a = build(&["one", "two", "three", "four", "five", "six", "seven"]);
    let b: HashMap<String, u32> = a.iter().collect::<Vec<_>>().into_iter().rev().map(|(k, v)| (k.clone(), *v)).collect();

    for h in handles_with(|b| b.encode.canonical = true) {
        let ea = to_vec(&a, h.as_ref()).unwrap();
        for _ in 0..4 {
            let eb = to_vec(&b, h.as_ref()).unwrap();
            assert_eq!(ea, eb, "handle {}", h.name());
        }
        let back: HashMap<String, u32> = from_slice(&ea, h.as_ref()).unwrap();
        assert_eq!(back, a);
    }
}

#[test]
fn test_canonical_struct_fields_sorted_by_name() {
    #[derive(Codec, Default)]
    struct Unsorted {
        zeta: u8,
        alpha: u8,
    }

    let mut h = JsonHandle::default();
    let v = Unsorted { zeta: 1, alpha: 2 };
    assert_eq!(to_vec(&v, &h).unwrap(), br#"{"zeta":1,"alpha":2}"#.to_vec());
    h.basic_mut().encode.canonical = true;
    assert_eq!(to_vec(&v, &h).unwrap(), br#"{"alpha":2,"zeta":1}"#.to_vec());
}

#[test]
fn test_dynamic_value_roundtrip() {
    let v = Value::Map(vec![
        (Value::Str("list".into()), Value::Array(vec![Value::Uint(1), Value::Int(-2)])),
        (Value::Str("float".into()), Value::Float(0.5)),
        (Value::Str("nil".into()), Value::Nil),
        (Value::Str("yes".into()), Value::Bool(true)),
    ]);
    for h in handles() {
        let bytes = to_vec(&v, h.as_ref()).unwrap();
        let back: Value = from_slice(&bytes, h.as_ref()).unwrap();
        assert_eq!(back, v, "handle {}", h.name());
    }
}

#[test]
fn test_stream_of_values() {
    let addr = |zip: u32| Address {
        street: format!("street {}", zip),
        zip,
    };
    for h in handles() {
        let mut out = Vec::new();
        {
            let mut enc = Encoder::new(&mut out, h.as_ref());
            for i in 0..5u32 {
                enc.encode(&addr(i * 1000)).unwrap();
            }
            enc.encode(&"done".to_string()).unwrap();
        }

        let mut dec = Decoder::new(&out[..], h.as_ref());
        for i in 0..5u32 {
            let mut a = Address::default();
            dec.decode(&mut a).unwrap();
            assert_eq!(a, addr(i * 1000), "handle {}", h.name());
        }
        let mut s = String::new();
        dec.decode(&mut s).unwrap();
        assert_eq!(s, "done");
        assert!(dec.decode(&mut s).unwrap_err().is_end_of_stream());
    }
}

#[test]
fn test_reused_encoder_and_decoder() {
    let h = CborHandle::default();
    let mut enc = Encoder::new_bytes(&h);
    enc.encode(&sample()).unwrap();
    let first = enc.take_bytes();
    enc.reset_bytes();
    enc.encode(&sample()).unwrap();
    assert_eq!(enc.bytes(), &first[..]);

    let mut dec = Decoder::from_bytes(&first, &h);
    let mut out = Everything::default();
    dec.decode(&mut out).unwrap();
    dec.reset_bytes(&first);
    let mut again = Everything::default();
    dec.decode(&mut again).unwrap();
    assert_eq!(out, again);
}
