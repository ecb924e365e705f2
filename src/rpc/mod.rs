//! RPC over any handle.
//!
//! A codec frames one request or response as a header plus a body. The
//! server reads requests until the peer closes, dispatching each to the
//! handler registered for its method; the client sends a request and waits
//! for the matching response.

mod codec;

pub use codec::{GoRpc, MsgpackSpecRpc};

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RpcError;
use crate::reflect::Reflect;
use crate::value::Value;

/// Request envelope fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub method: String,
    /// Sequence number chosen by the client, echoed in the response.
    pub seq: u64,
}

/// Response envelope fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Method being answered; empty when the envelope does not carry it.
    pub method: String,
    pub seq: u64,
    /// Set when the call failed; the body is then nil.
    pub error: Option<String>,
}

/// Client half of an RPC envelope.
pub trait ClientCodec {
    fn write_request(&mut self, header: &RequestHeader, body: &dyn Reflect) -> Result<(), RpcError>;

    /// Fails with [`RpcError::Shutdown`] when the stream ends before a header.
    fn read_response_header(&mut self) -> Result<ResponseHeader, RpcError>;

    fn read_response_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError>;
}

/// Server half of an RPC envelope.
pub trait ServerCodec {
    /// `None` when the stream ends cleanly before a header.
    fn read_request_header(&mut self) -> Result<Option<RequestHeader>, RpcError>;

    /// Fails with [`RpcError::InvalidBody`] when the body was consumed but
    /// does not decode into `body`; the codec stays usable after that.
    fn read_request_body(&mut self, body: &mut dyn Reflect) -> Result<(), RpcError>;

    fn write_response(&mut self, header: &ResponseHeader, body: &dyn Reflect) -> Result<(), RpcError>;
}

/// Outcome of one handler call: the reply body or an error message.
pub type Reply = Result<Box<dyn Reflect>, String>;

type Handler = dyn Fn(&str, &mut dyn ServerCodec) -> Result<Reply, RpcError> + Send + Sync;

/// Method registry and serve loop. Shared by reference between the
/// connections it serves.
#[derive(Default)]
pub struct RpcServer {
    handlers: Mutex<HashMap<String, Arc<Handler>>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `method`, replacing any previous handler.
    ///
    /// The request body decodes into a fresh `A`. A returned `Err` is sent
    /// to the caller as the response error; so is a panic inside `f`.
    pub fn register<A, R, F>(&self, method: &str, f: F)
    where
        A: Reflect + Default,
        R: Reflect,
        F: Fn(A) -> Result<R, String> + Send + Sync + 'static,
    {
        let handler = move |method: &str, codec: &mut dyn ServerCodec| -> Result<Reply, RpcError> {
            let mut args = A::default();
            codec.read_request_body(&mut args)?;
            Ok(match catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(Ok(reply)) => Ok(Box::new(reply) as Box<dyn Reflect>),
                Ok(Err(msg)) => Err(msg),
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    log::warn!("[rpc] handler for {} panicked: {}", method, msg);
                    Err(format!("rpc: handler for {} panicked: {}", method, msg))
                }
            })
        };
        let old = self
            .handlers
            .lock()
            .insert(method.to_string(), Arc::new(handler));
        if old.is_some() {
            log::debug!("[rpc] replaced handler for {}", method);
        } else {
            log::debug!("[rpc] registered handler for {}", method);
        }
    }

    /// Remove the handler for `method`. Returns whether one was registered.
    pub fn unregister(&self, method: &str) -> bool {
        let removed = self.handlers.lock().remove(method).is_some();
        if removed {
            log::debug!("[rpc] removed handler for {}", method);
        }
        removed
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.lock().contains_key(method)
    }

    /// Serve requests until the peer closes the stream.
    ///
    /// Handler failures and bodies that do not fit the handler's argument
    /// type are answered in-band. Envelope and stream errors end the loop,
    /// since the stream position is then unknown.
    pub fn serve_codec(&self, codec: &mut dyn ServerCodec) -> Result<(), RpcError> {
        while let Some(header) = codec.read_request_header()? {
            log::trace!("[rpc] request {} seq={}", header.method, header.seq);
            let handler = self.handlers.lock().get(&header.method).cloned();
            let reply = match handler {
                Some(h) => match h(&header.method, codec) {
                    Ok(reply) => reply,
                    Err(RpcError::InvalidBody(e)) => {
                        log::debug!("[rpc] bad body for {} seq={}: {}", header.method, header.seq, e);
                        Err(format!("rpc: bad request body for {}: {}", header.method, e))
                    }
                    Err(e) => return Err(e),
                },
                None => {
                    let mut discard = Value::Nil;
                    match codec.read_request_body(&mut discard) {
                        Ok(()) | Err(RpcError::InvalidBody(_)) => {}
                        Err(e) => return Err(e),
                    }
                    Err(format!("rpc: can't find method {}", header.method))
                }
            };
            let (error, body) = match reply {
                Ok(body) => (None, body),
                Err(msg) => (Some(msg), Box::new(Value::Nil) as Box<dyn Reflect>),
            };
            let response = ResponseHeader {
                method: header.method,
                seq: header.seq,
                error,
            };
            codec.write_response(&response, body.as_ref())?;
        }
        log::trace!("[rpc] peer closed the stream");
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<crate::Error>() {
        e.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Synchronous client: one outstanding call at a time.
pub struct RpcClient<C> {
    codec: C,
    seq: u64,
}

impl<C: ClientCodec> RpcClient<C> {
    pub fn new(codec: C) -> Self {
        RpcClient { codec, seq: 0 }
    }

    /// Call `method` with `args`, decoding the result into `reply`.
    ///
    /// A remote failure comes back as [`RpcError::Remote`] after its body
    /// has been consumed, so the client stays usable.
    pub fn call<A: Reflect, R: Reflect>(&mut self, method: &str, args: &A, reply: &mut R) -> Result<(), RpcError> {
        self.seq += 1;
        let header = RequestHeader {
            method: method.to_string(),
            seq: self.seq,
        };
        self.codec.write_request(&header, args)?;

        let response = self.codec.read_response_header()?;
        if response.seq != header.seq {
            return Err(RpcError::SequenceMismatch {
                want: header.seq,
                got: response.seq,
            });
        }
        match response.error {
            Some(msg) => {
                let mut discard = Value::Nil;
                self.codec.read_response_body(&mut discard)?;
                Err(RpcError::Remote(msg))
            }
            None => self.codec.read_response_body(reply),
        }
    }

    pub fn into_inner(self) -> C {
        self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_replace() {
        let server = RpcServer::new();
        server.register("double", |x: u32| Ok(x * 2));
        assert!(server.has_method("double"));
        server.register("double", |x: u32| Ok(x + x));
        assert!(server.unregister("double"));
        assert!(!server.unregister("double"));
        assert!(!server.has_method("double"));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("bad input");
        assert_eq!(panic_message(boxed.as_ref()), "bad input");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
