use std::fmt;

/// Failure signalled by a registered extension or a self-marshal hook.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ExtError(pub String);

impl ExtError {
    pub fn new(msg: impl fmt::Display) -> Self {
        ExtError(msg.to_string())
    }
}

/// Errors from the encode walk.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("circular reference found: {type_name} at {addr:#x} is already on the encode path")]
    CircularReference { type_name: &'static str, addr: usize },

    #[error("{format} cannot encode {what}")]
    Unsupported { format: &'static str, what: String },

    #[error("extension error for tag {tag}: {source}")]
    Extension { tag: u64, source: ExtError },

    #[error("self-marshal error in {type_name}: {source}")]
    Marshal {
        type_name: &'static str,
        source: ExtError,
    },

    #[error("map-by-slice value {type_name} has odd length {len}")]
    OddMapBySlice { type_name: &'static str, len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Other(String),
}

/// Errors from the decode walk.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The source was exhausted before the first byte of a top-level value.
    #[error("end of stream")]
    EndOfStream,

    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid {format} descriptor {byte:#04x} at offset {offset}")]
    InvalidDescriptor {
        format: &'static str,
        byte: u8,
        offset: usize,
    },

    #[error("invalid length {len}: {context}")]
    InvalidLength { len: u64, context: &'static str },

    #[error("{format} syntax error at offset {offset}: {message}")]
    Syntax {
        format: &'static str,
        offset: usize,
        message: String,
    },

    #[error("cannot decode {actual} into {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("value {value} overflows {target}")]
    Overflow { value: String, target: &'static str },

    #[error("array of length {len} cannot hold element {index}")]
    ArrayOverflow { len: usize, index: usize },

    #[error("no field named '{name}' in {type_name}")]
    UnknownField {
        type_name: &'static str,
        name: String,
    },

    #[error("no concrete type mapped for interface {interface}")]
    NoConcreteType { interface: &'static str },

    #[error("nesting depth exceeds {max}")]
    DepthExceeded { max: usize },

    #[error("invalid utf-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("extension error for tag {tag}: {source}")]
    Extension { tag: u64, source: ExtError },

    #[error("self-marshal error in {type_name}: {source}")]
    Marshal {
        type_name: &'static str,
        source: ExtError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Other(String),
}

impl DecodeError {
    /// True for a clean end of input between top-level values.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DecodeError::EndOfStream)
    }

    pub(crate) fn mismatch(expected: &'static str, actual: impl fmt::Display) -> Self {
        DecodeError::TypeMismatch {
            expected,
            actual: actual.to_string(),
        }
    }
}

/// Errors raised while configuring a handle.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("extension tag {tag} is already bound to {existing}")]
    TagConflict { tag: u64, existing: &'static str },

    #[error("{type_name} is not a map type")]
    NotAMapType { type_name: &'static str },

    #[error("{type_name} is not a sequence type")]
    NotASliceType { type_name: &'static str },
}

/// Errors from the RPC codec layer.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The body was read off the stream but does not fit the argument type.
    #[error("invalid request body: {0}")]
    InvalidBody(DecodeError),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("response sequence {got} does not match request {want}")]
    SequenceMismatch { want: u64, got: u64 },

    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(String),

    #[error("connection is shut down")]
    Shutdown,
}

/// Top-level error type that wraps all sub-errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Result type alias for polycodec operations.
pub type Result<T> = std::result::Result<T, Error>;
