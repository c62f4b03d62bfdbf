//! Call client error types.

use thiserror::Error;

/// Errors surfaced by the call client.
///
/// Transport failures are retryable and feed the reconnection loop;
/// rejections carry the gateway's status and are generally not retried.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The gateway answered with a non-success status.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The actor or channel on the other end is gone.
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Call not found: {0}")]
    CallNotFound(String),

    /// The media transport refused an operation.
    #[error("Peer transport error: {0}")]
    PeerTransport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the error means the target does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::CallNotFound(_) | ClientError::Rejected { status: 404, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Transport("reset".to_string()).is_retryable());
        assert!(ClientError::Rejected {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Rejected {
            status: 400,
            message: "roomId".to_string()
        }
        .is_retryable());
        assert!(!ClientError::ChannelClosed.is_retryable());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ClientError::CallNotFound("c-1".to_string()).is_not_found());
        assert!(ClientError::Rejected {
            status: 404,
            message: String::new()
        }
        .is_not_found());
        assert!(!ClientError::Decode("eof".to_string()).is_not_found());
    }
}
