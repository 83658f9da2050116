//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding protocol lines.
///
/// None of these are fatal for a service: the offending connection answers
/// with `{ok:false, error}` and is closed, other connections are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line is not a JSON object at all.
    #[error("malformed payload: {0}")]
    InvalidJson(String),

    /// The object has no string `type` field.
    #[error("request has no type field")]
    MissingType,

    /// The `type` field names a request kind this protocol does not define.
    #[error("Unknown request type: {0}")]
    UnknownType(String),

    /// The request kind is known but its fields do not decode.
    #[error("malformed {request_type} request: {reason}")]
    Malformed {
        /// Request kind taken from the `type` field
        request_type: String,
        /// Decoder message
        reason: String,
    },

    /// Encoding a message failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Line exceeded [`crate::MAX_LINE_BYTES`].
    #[error("line too long: {len} bytes (max {max})")]
    LineTooLong {
        /// Observed length
        len: usize,
        /// Configured limit
        max: usize,
    },
}

impl ProtocolError {
    /// Request kind the error is attributed to, if one could be read.
    pub fn request_type(&self) -> Option<&str> {
        match self {
            Self::UnknownType(kind) => Some(kind),
            Self::Malformed { request_type, .. } => Some(request_type),
            _ => None,
        }
    }
}
