//! RPC with each envelope and handle, over loopback TCP and in memory.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use polycodec::rpc::{ClientCodec, GoRpc, MsgpackSpecRpc, RequestHeader, RpcClient, RpcServer};
use polycodec::{
    BincHandle, CborHandle, Codec, Handle, JsonHandle, MsgpackHandle, RpcError, SimpleHandle, Value,
};
use pretty_assertions::assert_eq;

#[derive(Codec, Debug, Default, Clone, PartialEq)]
struct Args {
    a: i64,
    b: i64,
}

#[derive(Codec, Debug, Default, PartialEq)]
struct Quotient {
    quo: i64,
    rem: i64,
}

fn arith() -> RpcServer {
    let server = RpcServer::new();
    server.register("Arith.Add", |args: Args| Ok(args.a + args.b));
    server.register("Arith.Divide", |args: Args| {
        if args.b == 0 {
            return Err("divide by zero".to_string());
        }
        Ok(Quotient {
            quo: args.a / args.b,
            rem: args.a % args.b,
        })
    });
    server.register("Arith.Echo", |v: Value| Ok(v));
    server.register("Arith.Panic", |_: Args| -> Result<i64, String> { panic!("boom") });
    server
}

#[derive(Clone, Copy)]
enum Envelope {
    Go,
    MsgpackSpec,
}

type MakeHandle = fn() -> Box<dyn Handle>;

fn spawn_server(envelope: Envelope, make: MakeHandle) -> (SocketAddr, JoinHandle<Result<(), RpcError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let join = thread::spawn(move || {
        let server = arith();
        let (stream, _) = listener.accept().unwrap();
        let reader = stream.try_clone().unwrap();
        let h = make();
        let res = match envelope {
            Envelope::Go => server.serve_codec(&mut GoRpc::new(reader, stream, h.as_ref())),
            Envelope::MsgpackSpec => server.serve_codec(&mut MsgpackSpecRpc::new(reader, stream, h.as_ref())),
        };
        res
    });
    (addr, join)
}

fn exercise<C: ClientCodec>(client: &mut RpcClient<C>, label: &str) {
    let mut sum = 0i64;
    client.call("Arith.Add", &Args { a: 2, b: 3 }, &mut sum).unwrap();
    assert_eq!(sum, 5, "{}", label);

    let mut q = Quotient::default();
    client.call("Arith.Divide", &Args { a: 17, b: 5 }, &mut q).unwrap();
    assert_eq!(q, Quotient { quo: 3, rem: 2 }, "{}", label);

    match client.call("Arith.Divide", &Args { a: 1, b: 0 }, &mut q) {
        Err(RpcError::Remote(msg)) => assert_eq!(msg, "divide by zero", "{}", label),
        other => panic!("{}: unexpected {:?}", label, other),
    }

    match client.call("Arith.Panic", &Args::default(), &mut sum) {
        Err(RpcError::Remote(msg)) => assert!(msg.contains("boom"), "{}: {}", label, msg),
        other => panic!("{}: unexpected {:?}", label, other),
    }

    match client.call("Arith.Nope", &Args::default(), &mut sum) {
        Err(RpcError::Remote(msg)) => assert_eq!(msg, "rpc: can't find method Arith.Nope", "{}", label),
        other => panic!("{}: unexpected {:?}", label, other),
    }

    // The connection survives the failures above.
    let sent = Value::from_pairs([("k", Value::Array(vec![Value::Str("v".into()), Value::Bool(true)]))]);
    let mut echoed = Value::Nil;
    client.call("Arith.Echo", &sent, &mut echoed).unwrap();
    assert_eq!(echoed, sent, "{}", label);

    client.call("Arith.Add", &Args { a: -10, b: 4 }, &mut sum).unwrap();
    assert_eq!(sum, -6, "{}", label);
}

fn msgpack() -> Box<dyn Handle> {
    Box::new(MsgpackHandle::default())
}

fn binc() -> Box<dyn Handle> {
    Box::new(BincHandle::default())
}

fn simple() -> Box<dyn Handle> {
    Box::new(SimpleHandle::default())
}

fn cbor() -> Box<dyn Handle> {
    Box::new(CborHandle::default())
}

fn json() -> Box<dyn Handle> {
    Box::new(JsonHandle::default())
}

#[test]
fn test_go_rpc_over_tcp() {
    let makers: [(&str, MakeHandle); 5] = [
        ("msgpack", msgpack),
        ("binc", binc),
        ("simple", simple),
        ("cbor", cbor),
        ("json", json),
    ];
    for (label, make) in makers {
        let (addr, join) = spawn_server(Envelope::Go, make);
        let h = make();
        {
            let stream = TcpStream::connect(addr).unwrap();
            let mut client = RpcClient::new(GoRpc::new(stream.try_clone().unwrap(), stream, h.as_ref()));
            exercise(&mut client, label);
        }
        // Closing the client ends the serve loop cleanly.
        join.join().unwrap().unwrap();
    }
}

#[test]
fn test_msgpack_spec_rpc_over_tcp() {
    let makers: [(&str, MakeHandle); 2] = [("msgpack", msgpack), ("cbor", cbor)];
    for (label, make) in makers {
        let (addr, join) = spawn_server(Envelope::MsgpackSpec, make);
        let h = make();
        {
            let stream = TcpStream::connect(addr).unwrap();
            let mut client = RpcClient::new(MsgpackSpecRpc::new(stream.try_clone().unwrap(), stream, h.as_ref()));
            exercise(&mut client, label);
        }
        join.join().unwrap().unwrap();
    }
}

#[test]
fn test_client_sees_shutdown() {
    let h = MsgpackHandle::default();
    let mut client = RpcClient::new(MsgpackSpecRpc::new(std::io::empty(), Vec::new(), &h));
    let mut out = 0i64;
    assert!(matches!(
        client.call("Arith.Add", &Args::default(), &mut out),
        Err(RpcError::Shutdown)
    ));
}

#[test]
fn test_server_stops_on_garbage() {
    let h = MsgpackHandle::default();
    let server = arith();
    // A bare integer where an envelope array belongs.
    let input: &[u8] = &[0x05];
    let mut codec = MsgpackSpecRpc::new(input, Vec::new(), &h);
    assert!(server.serve_codec(&mut codec).is_err());
}

#[test]
fn test_bad_body_is_answered_in_band() {
    let hs: [(&str, MakeHandle); 2] = [("msgpack", msgpack), ("json", json)];
    for (label, make) in hs {
        let h = make();
        let mut wire = Vec::new();
        {
            let mut c = GoRpc::new(std::io::empty(), &mut wire, h.as_ref());
            let add = |seq| RequestHeader {
                method: "Arith.Add".into(),
                seq,
            };
            c.write_request(&add(1), &"oops".to_string()).unwrap();
            c.write_request(&add(2), &Args { a: 2, b: 3 }).unwrap();
        }

        let mut out = Vec::new();
        arith()
            .serve_codec(&mut GoRpc::new(&wire[..], &mut out, h.as_ref()))
            .unwrap();

        let mut c = GoRpc::new(&out[..], Vec::new(), h.as_ref());
        let first = c.read_response_header().unwrap();
        assert_eq!(first.seq, 1, "{}", label);
        let msg = first.error.unwrap_or_default();
        assert!(msg.starts_with("rpc: bad request body for Arith.Add"), "{}: {}", label, msg);
        c.read_response_body(&mut Value::Nil).unwrap();

        let second = c.read_response_header().unwrap();
        assert_eq!((second.seq, second.error), (2, None), "{}", label);
        let mut sum = 0i64;
        c.read_response_body(&mut sum).unwrap();
        assert_eq!(sum, 5, "{}", label);
    }
}

#[test]
fn test_bad_body_keeps_msgpack_spec_stream_in_step() {
    let h = MsgpackHandle::default();
    let mut wire = Vec::new();
    {
        let mut c = MsgpackSpecRpc::new(std::io::empty(), &mut wire, &h);
        let divide = |seq| RequestHeader {
            method: "Arith.Divide".into(),
            seq,
        };
        c.write_request(&divide(1), &"oops".to_string()).unwrap();
        c.write_request(&divide(2), &Args { a: 9, b: 4 }).unwrap();
    }

    let mut out = Vec::new();
    arith()
        .serve_codec(&mut MsgpackSpecRpc::new(&wire[..], &mut out, &h))
        .unwrap();

    let mut c = MsgpackSpecRpc::new(&out[..], Vec::new(), &h);
    let first = c.read_response_header().unwrap();
    assert_eq!(first.seq, 1);
    assert!(first.error.is_some());
    c.read_response_body(&mut Value::Nil).unwrap();

    let second = c.read_response_header().unwrap();
    assert_eq!((second.seq, second.error), (2, None));
    let mut q = Quotient::default();
    c.read_response_body(&mut q).unwrap();
    assert_eq!(q, Quotient { quo: 2, rem: 1 });
}
