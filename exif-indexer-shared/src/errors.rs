//! Error types for the shared wire format.

use thiserror::Error;

/// Errors raised while encoding or decoding a [`DispatchMessage`](crate::DispatchMessage).
#[derive(Error, Debug)]
pub enum MessageError {
    /// The payload could not be serialized.
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// The payload is not valid JSON or not a metadata map.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The envelope must hold exactly one identifier.
    #[error("Expected exactly one identifier in message, found {0}")]
    InvalidEnvelope(usize),
}

impl MessageError {
    /// Create an encode error.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::EncodeError(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}
