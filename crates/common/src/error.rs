//! Common error types for signaling components.

use thiserror::Error;

/// Errors raised while interpreting wire payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message type did not match what the decoder expected
    #[error("Unexpected message type: {0}")]
    UnexpectedType(String),

    /// Payload could not be decoded into the expected shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Result type alias using `ProtocolError`
pub type Result<T> = std::result::Result<T, ProtocolError>;
