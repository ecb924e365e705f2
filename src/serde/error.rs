//! Error type for the serde bridge.

use std::fmt::Display;

use crate::error::{DecodeError, EncodeError};

/// Error type for serde serialization/deserialization through [`crate::Value`].
#[derive(Debug)]
pub enum SerdeError {
    /// The value's shape does not fit what the target type asked for.
    TypeMismatch { expected: String, actual: String },
    /// The type has no dynamic value representation.
    UnsupportedType(String),
    /// Error while encoding the intermediate value.
    Encode(EncodeError),
    /// Error while decoding the intermediate value.
    Decode(DecodeError),
    /// Custom error message.
    Custom(String),
}

impl Display for SerdeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerdeError::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {}, got {}", expected, actual)
            }
            SerdeError::UnsupportedType(ty) => write!(f, "unsupported type: {}", ty),
            SerdeError::Encode(e) => write!(f, "encode error: {}", e),
            SerdeError::Decode(e) => write!(f, "decode error: {}", e),
            SerdeError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SerdeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerdeError::Encode(e) => Some(e),
            SerdeError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodeError> for SerdeError {
    fn from(e: EncodeError) -> Self {
        SerdeError::Encode(e)
    }
}

impl From<DecodeError> for SerdeError {
    fn from(e: DecodeError) -> Self {
        SerdeError::Decode(e)
    }
}

impl serde::ser::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}

impl serde::de::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}
