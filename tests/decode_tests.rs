//! Decoding edge cases: hostile lengths, nesting, conversions, map merging.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use polycodec::{
    decode_into, from_slice, to_vec, BincHandle, CborHandle, Codec, DecodeError, Decoder, Handle, JsonHandle,
    MsgpackHandle, Raw, SimpleHandle, Value,
};
use pretty_assertions::assert_eq;

#[test]
fn test_huge_length_prefix_is_safe() {
    let h = MsgpackHandle::default();
    // array 32 claiming u32::MAX elements, followed by two.
    let data = [0xdd, 0xff, 0xff, 0xff, 0xff, 0x01, 0x02];
    let err = from_slice::<Vec<u64>>(&data, &h).unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedEof { .. }), "{:?}", err);

    // str 32 claiming 4 GiB.
    let data = [0xdb, 0xff, 0xff, 0xff, 0xff, b'a'];
    assert!(matches!(
        from_slice::<String>(&data, &h),
        Err(DecodeError::UnexpectedEof { .. })
    ));

    // CBOR map with a 2^63 entry count.
    let data = [0xbb, 0x80, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x01];
    assert!(from_slice::<HashMap<u8, u8>>(&data, &CborHandle::default()).is_err());
}

#[test]
fn test_init_capacity_is_capped() {
    let mut h = MsgpackHandle::default();
    h.basic_mut().decode.max_init_len = 8;
    let dec = Decoder::from_bytes(&[], &h);
    assert_eq!(dec.init_capacity(Some(1 << 40)), 8);
    assert_eq!(dec.init_capacity(Some(3)), 3);
}

#[test]
fn test_max_depth() {
    let mut h = JsonHandle::default();
    let deep = format!("{}{}", "[".repeat(300), "]".repeat(300));
    assert!(matches!(
        from_slice::<Value>(deep.as_bytes(), &h),
        Err(DecodeError::DepthExceeded { max: 256 })
    ));

    h.basic_mut().decode.max_depth = 400;
    let v: Value = from_slice(deep.as_bytes(), &h).unwrap();
    assert!(matches!(v, Value::Array(ref a) if a.len() == 1));

    // Skipping an unknown field is bounded too.
    h.basic_mut().decode.max_depth = 16;
    let nested = format!("{{\"skip\":{}{}}}", "[".repeat(40), "]".repeat(40));
    assert!(matches!(
        from_slice::<Ping>(nested.as_bytes(), &h),
        Err(DecodeError::DepthExceeded { .. })
    ));
}

#[test]
fn test_tag_chain_depth() {
    let h = CborHandle::default();
    // Each tag head nests one level.
    let mut chain = vec![0xc1u8; 1000];
    chain.push(0x01);
    assert!(matches!(
        from_slice::<Value>(&chain, &h),
        Err(DecodeError::DepthExceeded { max: 256 })
    ));

    // Skipped as an unknown field.
    let mut doc = vec![0xa1, 0x64, b's', b'k', b'i', b'p'];
    doc.extend_from_slice(&chain);
    assert!(matches!(
        from_slice::<Ping>(&doc, &h),
        Err(DecodeError::DepthExceeded { .. })
    ));

    // A short chain is still fine either way.
    let v: Value = from_slice(&[0xc1, 0xc1, 0xc1, 0x01], &h).unwrap();
    let mut depth = 0;
    let mut cur = &v;
    while let Value::Ext(ext) = cur {
        assert_eq!(ext.tag, 1);
        depth += 1;
        cur = ext.value.as_deref().unwrap();
    }
    assert_eq!(depth, 3);
    assert_eq!(cur, &Value::Uint(1));

    let doc = [0xa2, 0x64, b's', b'k', b'i', b'p', 0xc1, 0xc1, 0x01, 0x63, b's', b'e', b'q', 0x07];
    let p: Ping = from_slice(&doc, &h).unwrap();
    assert_eq!(p.seq, 7);
}

#[test]
fn test_truncated_input() {
    let h = BincHandle::default();
    let bytes = to_vec(&vec!["alpha".to_string(), "beta".to_string()], &h).unwrap();
    for cut in 1..bytes.len() {
        let err = from_slice::<Vec<String>>(&bytes[..cut], &h).unwrap_err();
        assert!(
            matches!(err, DecodeError::UnexpectedEof { .. }),
            "cut at {}: {:?}",
            cut,
            err
        );
    }
    assert!(from_slice::<Vec<String>>(&[], &h).unwrap_err().is_end_of_stream());
}

#[test]
fn test_integer_conversions() {
    let h = MsgpackHandle::default();

    let max = to_vec(&i64::MAX, &h).unwrap();
    assert_eq!(from_slice::<u64>(&max, &h).unwrap(), i64::MAX as u64);

    let umax = to_vec(&u64::MAX, &h).unwrap();
    assert!(matches!(
        from_slice::<i64>(&umax, &h),
        Err(DecodeError::Overflow { target: "i64", .. })
    ));

    let neg = to_vec(&-1i32, &h).unwrap();
    assert!(matches!(
        from_slice::<u32>(&neg, &h),
        Err(DecodeError::Overflow { .. })
    ));

    // Integers widen into floats; integral floats narrow into integers.
    assert_eq!(from_slice::<f64>(&to_vec(&7u8, &h).unwrap(), &h).unwrap(), 7.0);
    assert_eq!(from_slice::<f32>(&to_vec(&-3i64, &h).unwrap(), &h).unwrap(), -3.0);
    assert_eq!(from_slice::<i16>(&to_vec(&12.0f64, &h).unwrap(), &h).unwrap(), 12);
    assert!(matches!(
        from_slice::<i16>(&to_vec(&1.5f64, &h).unwrap(), &h),
        Err(DecodeError::TypeMismatch { .. })
    ));
}

#[test]
fn test_type_mismatch() {
    let h = CborHandle::default();
    let bytes = to_vec(&"text".to_string(), &h).unwrap();
    assert!(matches!(
        from_slice::<bool>(&bytes, &h),
        Err(DecodeError::TypeMismatch { .. })
    ));
    assert!(matches!(
        from_slice::<Vec<u32>>(&to_vec(&true, &h).unwrap(), &h),
        Err(DecodeError::TypeMismatch { .. })
    ));
}

#[test]
fn test_map_merge_and_nil_values() {
    let h = JsonHandle::default();
    let mut m: HashMap<String, u32> = HashMap::new();
    m.insert("keep".into(), 1);
    m.insert("gone".into(), 2);

    decode_into(br#"{"gone":null,"new":3}"#, &h, &mut m).unwrap();
    // Existing entries survive; nil stores the zero value.
    assert_eq!(m.get("keep"), Some(&1));
    assert_eq!(m.get("gone"), Some(&0));
    assert_eq!(m.get("new"), Some(&3));

    let mut h = JsonHandle::default();
    h.basic_mut().decode.delete_on_nil_map_value = true;
    decode_into(br#"{"gone":null}"#, &h, &mut m).unwrap();
    assert_eq!(m.get("gone"), None);
    assert_eq!(m.len(), 2);
}

#[test]
fn test_nested_map_delete_applies_per_level() {
    let mut h = JsonHandle::default();
    h.basic_mut().decode.delete_on_nil_map_value = true;
    let mut m: BTreeMap<String, BTreeMap<String, u8>> = BTreeMap::new();
    m.entry("a".into()).or_default().insert("x".into(), 1);
    m.entry("a".into()).or_default().insert("y".into(), 2);

    decode_into(br#"{"a":{"x":null,"z":3}}"#, &h, &mut m).unwrap();
    let inner = &m["a"];
    assert_eq!(inner.get("x"), None);
    assert_eq!(inner.get("y"), Some(&2));
    assert_eq!(inner.get("z"), Some(&3));
}

#[test]
fn test_swallow_consumes_exactly_one_value() {
    let handles: Vec<Box<dyn Handle>> = vec![
        Box::new(MsgpackHandle::default()),
        Box::new(BincHandle::default()),
        Box::new(SimpleHandle::default()),
        Box::new(CborHandle::default()),
        Box::new(JsonHandle::default()),
    ];
    let complex = Value::Map(vec![
        (
            Value::Str("k".into()),
            Value::Array(vec![Value::Float(1.25), Value::Bytes(vec![1, 2]), Value::Nil]),
        ),
        (Value::Int(-7), Value::Map(Vec::new())),
    ]);
    for h in handles {
        let mut bytes = to_vec(&complex, h.as_ref()).unwrap();
        let marker = to_vec(&[9u32, 8], h.as_ref()).unwrap();
        bytes.extend_from_slice(&marker);

        let mut dec = Decoder::from_bytes(&bytes, h.as_ref());
        dec.swallow().unwrap();
        let mut after = [0u32; 2];
        dec.decode(&mut after).unwrap();
        assert_eq!(after, [9, 8], "handle {}", h.name());
        assert_eq!(dec.num_read(), bytes.len());
    }
}

#[derive(Codec, Debug, Default, PartialEq)]
struct Envelope {
    kind: String,
    payload: Raw,
}

#[derive(Codec, Debug, Default, PartialEq)]
struct Ping {
    seq: u32,
    tags: Vec<String>,
}

#[test]
fn test_raw_capture_and_redecode() {
    let mut h = MsgpackHandle::default();
    h.basic_mut().raw = true;

    let ping = Ping {
        seq: 11,
        tags: vec!["a".into()],
    };
    let env = Envelope {
        kind: "ping".into(),
        payload: Raw(to_vec(&ping, &h).unwrap()),
    };
    let bytes = to_vec(&env, &h).unwrap();

    // Raw content is spliced in verbatim, not wrapped as bytes.
    let as_value: Value = from_slice(&bytes, &h).unwrap();
    let payload = as_value
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("payload")))
        .map(|(_, v)| v.clone());
    assert!(matches!(payload, Some(Value::Map(_))));

    let back: Envelope = from_slice(&bytes, &h).unwrap();
    assert_eq!(back.kind, "ping");
    assert_eq!(back.payload, env.payload);
    let inner: Ping = from_slice(back.payload.as_bytes(), &h).unwrap();
    assert_eq!(inner, ping);
}

#[test]
fn test_raw_without_raw_mode_is_bytes() {
    let h = CborHandle::default();
    let r = Raw(vec![0xde, 0xad]);
    assert_eq!(to_vec(&r, &h).unwrap(), vec![0x42, 0xde, 0xad]);
    assert_eq!(from_slice::<Raw>(&[0x42, 0xde, 0xad], &h).unwrap(), r);
}

#[test]
fn test_intern_string() {
    let mut h = CborHandle::default();
    let words = vec!["same".to_string(), "same".to_string(), "other".to_string()];
    let bytes = to_vec(&words, &h).unwrap();

    let plain: Vec<Arc<str>> = from_slice(&bytes, &h).unwrap();
    assert!(!Arc::ptr_eq(&plain[0], &plain[1]));

    h.basic_mut().decode.intern_string = true;
    let interned: Vec<Arc<str>> = from_slice(&bytes, &h).unwrap();
    assert!(Arc::ptr_eq(&interned[0], &interned[1]));
    assert_eq!(&*interned[2], "other");
}

#[test]
fn test_fixed_array_lengths() {
    let h = SimpleHandle::default();
    let short: [u8; 4] = from_slice(&to_vec(&vec![1u16, 2], &h).unwrap(), &h).unwrap();
    assert_eq!(short, [1, 2, 0, 0]);
    assert!(matches!(
        from_slice::<[u16; 1]>(&to_vec(&vec![1u16, 2], &h).unwrap(), &h),
        Err(DecodeError::ArrayOverflow { len: 1, index: 1 })
    ));
}

#[test]
fn test_reader_decoder_matches_slice() {
    let h = BincHandle::default();
    let v: BTreeMap<String, Vec<i64>> = [("k".to_string(), vec![-1, 2, 300])].into_iter().collect();
    let bytes = to_vec(&v, &h).unwrap();
    let mut from_reader = BTreeMap::new();
    Decoder::new(std::io::Cursor::new(bytes.clone()), &h)
        .decode(&mut from_reader)
        .unwrap();
    assert_eq!(from_reader, v);
}
