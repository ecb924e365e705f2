//! Wire envelopes for the RPC layer.

use std::io::{Read, Write};

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, RpcError};
use crate::handle::Handle;
use crate::reflect::Reflect;
use crate::value::Value;

use super::{ClientCodec, RequestHeader, ResponseHeader, ServerCodec};

/// Header and body as two consecutive top-level values.
///
/// Headers are maps keyed `ServiceMethod`, `Seq` and (responses only)
/// `Error`, where an empty error string means success. Text handles put a
/// newline after each value so a scalar body never waits on the next
/// message to end.
pub struct GoRpc<'a> {
    enc: Encoder<'a>,
    dec: Decoder<'a>,
    handle: &'a dyn Handle,
    newline: bool,
}

impl<'a> GoRpc<'a> {
    pub fn new<R: Read + 'a, W: Write + 'a>(reader: R, writer: W, handle: &'a dyn Handle) -> Self {
        GoRpc {
            enc: Encoder::new(writer, handle),
            dec: Decoder::new(reader, handle),
            handle,
            newline: !handle.is_binary(),
        }
    }

    fn write(&mut self, v: &dyn Reflect) -> Result<(), RpcError> {
        let newline = self.newline;
        self.enc.encode_top(|e| {
            e.encode_value(v)?;
            if newline {
                e.write_raw(b"\n")?;
            }
            Ok(())
        })?;
        Ok(())
    }

    // A header that is not there is a clean end; anything else is an error.
    fn read_header(&mut self) -> Result<Option<Vec<(Value, Value)>>, RpcError> {
        if self.dec.at_end()? {
            return Ok(None);
        }
        match self.dec.read_dynamic()? {
            Value::Map(entries) => Ok(Some(entries)),
            other => Err(RpcError::InvalidEnvelope(format!("header is {:?}, not a map", other))),
        }
    }

    fn read_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError> {
        if self.dec.at_end()? {
            return Err(RpcError::Decode(DecodeError::EndOfStream));
        }
        self.dec.decode_value(body)?;
        Ok(())
    }
}

// Decode a body already taken off the stream, so a mismatch leaves the
// stream in step with the next message.
fn decode_captured(raw: &[u8], handle: &dyn Handle, body: &mut dyn Reflect) -> Result<(), RpcError> {
    Decoder::from_bytes(raw, handle)
        .decode_value(body)
        .map_err(RpcError::InvalidBody)
}

fn header_field<'v>(entries: &'v [(Value, Value)], name: &str) -> Option<&'v Value> {
    entries
        .iter()
        .find(|(k, _)| k.as_str() == Some(name))
        .map(|(_, v)| v)
}

fn header_seq(entries: &[(Value, Value)]) -> Result<u64, RpcError> {
    match header_field(entries, "Seq") {
        Some(Value::Uint(n)) => Ok(*n),
        Some(Value::Int(n)) if *n >= 0 => Ok(*n as u64),
        other => Err(RpcError::InvalidEnvelope(format!("bad Seq {:?}", other))),
    }
}

fn header_method(entries: &[(Value, Value)]) -> Result<String, RpcError> {
    match header_field(entries, "ServiceMethod") {
        Some(Value::Str(s)) => Ok(s.clone()),
        other => Err(RpcError::InvalidEnvelope(format!("bad ServiceMethod {:?}", other))),
    }
}

impl ClientCodec for GoRpc<'_> {
    fn write_request(&mut self, header: &RequestHeader, body: &dyn Reflect) -> Result<(), RpcError> {
        let h = Value::Map(vec![
            (Value::from("ServiceMethod"), Value::from(header.method.as_str())),
            (Value::from("Seq"), Value::Uint(header.seq)),
        ]);
        self.write(&h)?;
        self.write(body)
    }

    fn read_response_header(&mut self) -> Result<ResponseHeader, RpcError> {
        let entries = self.read_header()?.ok_or(RpcError::Shutdown)?;
        let error = match header_field(&entries, "Error") {
            None | Some(Value::Nil) => None,
            Some(Value::Str(s)) if s.is_empty() => None,
            Some(Value::Str(s)) => Some(s.clone()),
            Some(other) => Some(format!("{:?}", other)),
        };
        Ok(ResponseHeader {
            method: header_method(&entries)?,
            seq: header_seq(&entries)?,
            error,
        })
    }

    fn read_response_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError> {
        self.read_body(body)
    }
}

impl ServerCodec for GoRpc<'_> {
    fn read_request_header(&mut self) -> Result<Option<RequestHeader>, RpcError> {
        let Some(entries) = self.read_header()? else {
            return Ok(None);
        };
        Ok(Some(RequestHeader {
            method: header_method(&entries)?,
            seq: header_seq(&entries)?,
        }))
    }

    fn read_request_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError> {
        if self.dec.at_end()? {
            return Err(RpcError::Decode(DecodeError::EndOfStream));
        }
        let raw = self.dec.capture_value()?;
        decode_captured(&raw, self.handle, body)
    }

    fn write_response(&mut self, header: &ResponseHeader, body: &dyn Reflect) -> Result<(), RpcError> {
        let h = Value::Map(vec![
            (Value::from("ServiceMethod"), Value::from(header.method.as_str())),
            (Value::from("Seq"), Value::Uint(header.seq)),
            (
                Value::from("Error"),
                Value::from(header.error.as_deref().unwrap_or("")),
            ),
        ]);
        self.write(&h)?;
        self.write(body)
    }
}

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;

/// The msgpack-rpc envelope: requests are `[0, msgid, method, [params]]`
/// and responses `[1, msgid, error, result]`. The body travels as the only
/// parameter.
pub struct MsgpackSpecRpc<'a> {
    enc: Encoder<'a>,
    dec: Decoder<'a>,
    handle: &'a dyn Handle,
}

impl<'a> MsgpackSpecRpc<'a> {
    pub fn new<R: Read + 'a, W: Write + 'a>(reader: R, writer: W, handle: &'a dyn Handle) -> Self {
        MsgpackSpecRpc {
            enc: Encoder::new(writer, handle),
            dec: Decoder::new(reader, handle),
            handle,
        }
    }

    // Open the envelope and check its type; leaves the reader on element 1.
    fn open(&mut self, want: u64) -> Result<Option<()>, RpcError> {
        if self.dec.at_end()? {
            return Ok(None);
        }
        match self.dec.read_array_start()? {
            Some(4) | None => {}
            Some(n) => {
                return Err(RpcError::InvalidEnvelope(format!("envelope has {} elements, want 4", n)));
            }
        }
        self.dec.read_array_elem(0)?;
        let kind = self.dec.read_u64()?;
        if kind != want {
            return Err(RpcError::InvalidEnvelope(format!(
                "message type {}, want {}",
                kind, want
            )));
        }
        self.dec.read_array_elem(1)?;
        Ok(Some(()))
    }
}

impl ClientCodec for MsgpackSpecRpc<'_> {
    fn write_request(&mut self, header: &RequestHeader, body: &dyn Reflect) -> Result<(), RpcError> {
        self.enc.encode_top(|e| {
            e.write_array_start(4);
            e.write_array_elem(0);
            e.encode_uint(REQUEST)?;
            e.write_array_elem(1);
            e.encode_uint(header.seq)?;
            e.write_array_elem(2);
            e.encode_str(&header.method)?;
            e.write_array_elem(3);
            e.write_array_start(1);
            e.write_array_elem(0);
            e.encode_value(body)?;
            e.write_array_end();
            e.write_array_end();
            Ok(())
        })?;
        Ok(())
    }

    fn read_response_header(&mut self) -> Result<ResponseHeader, RpcError> {
        self.open(RESPONSE)?.ok_or(RpcError::Shutdown)?;
        let seq = self.dec.read_u64()?;
        self.dec.read_array_elem(2)?;
        let error = match self.dec.read_dynamic()? {
            Value::Nil => None,
            Value::Str(s) => Some(s),
            other => Some(format!("{:?}", other)),
        };
        self.dec.read_array_elem(3)?;
        Ok(ResponseHeader {
            method: String::new(),
            seq,
            error,
        })
    }

    fn read_response_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError> {
        self.dec.decode_value(body)?;
        self.dec.read_array_end()?;
        Ok(())
    }
}

impl ServerCodec for MsgpackSpecRpc<'_> {
    fn read_request_header(&mut self) -> Result<Option<RequestHeader>, RpcError> {
        if self.open(REQUEST)?.is_none() {
            return Ok(None);
        }
        let seq = self.dec.read_u64()?;
        self.dec.read_array_elem(2)?;
        let method = self.dec.read_string()?;
        self.dec.read_array_elem(3)?;
        Ok(Some(RequestHeader { method, seq }))
    }

    fn read_request_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError> {
        let len = self.dec.read_array_start()?;
        let mut res = Ok(());
        let mut i = 0;
        while self.dec.has_next(len, i)? {
            self.dec.read_array_elem(i)?;
            if i == 0 {
                let raw = self.dec.capture_value()?;
                res = decode_captured(&raw, self.handle, body);
            } else {
                self.dec.swallow()?;
            }
            i += 1;
        }
        self.dec.read_array_end()?;
        self.dec.read_array_end()?;
        res
    }

    fn write_response(&mut self, header: &ResponseHeader, body: &dyn Reflect) -> Result<(), RpcError> {
        self.enc.encode_top(|e| {
            e.write_array_start(4);
            e.write_array_elem(0);
            e.encode_uint(RESPONSE)?;
            e.write_array_elem(1);
            e.encode_uint(header.seq)?;
            e.write_array_elem(2);
            match &header.error {
                Some(msg) => e.encode_str(msg)?,
                None => e.encode_nil()?,
            }
            e.write_array_elem(3);
            e.encode_value(body)?;
            e.write_array_end();
            Ok(())
        })?;
        Ok(())
    }
}
