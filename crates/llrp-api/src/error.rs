use thiserror::Error;

use crate::frame::MessageType;
use crate::param::{ConnectionAttemptStatus, LlrpStatus};

/// Top-level error type for the `llrp-api` crate.
///
/// Covers framing, transport, and reader-reported failures.
/// `llrp-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level I/O failure (refused, reset, unreachable, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connect did not complete in time.
    #[error("Dial to {address} timed out after {timeout_secs}s")]
    DialTimeout { address: String, timeout_secs: u64 },

    /// A request did not receive its response in time.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The client was closed intentionally (shutdown or close).
    #[error("Client closed")]
    ClientClosed,

    /// The reader closed the connection while the client was in use.
    #[error("Connection lost")]
    ConnectionLost,

    /// `connect` was called on a client that is already running.
    #[error("Client is already connected")]
    AlreadyConnected,

    /// The reader refused the connection attempt.
    #[error("Reader refused connection: {0}")]
    ConnectionAttemptFailed(ConnectionAttemptStatus),

    // ── Reader status ───────────────────────────────────────────────
    /// The response carried a non-success LLRPStatus.
    #[error("Reader returned status {}: {}", .0.code, .0.description)]
    Status(LlrpStatus),

    /// The reader answered with ERROR_MESSAGE.
    #[error("Reader sent ERROR_MESSAGE {}: {}", .0.code, .0.description)]
    ErrorMessage(LlrpStatus),

    /// A response arrived with a type the request does not pair with.
    #[error("Unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        expected: MessageType,
        got: MessageType,
    },

    // ── Framing ─────────────────────────────────────────────────────
    /// Malformed frame or parameter.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A frame announced a length above the codec limit.
    #[error("Frame of {length} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { length: usize, limit: usize },
}

impl Error {
    /// Returns `true` if retrying the same operation may succeed.
    ///
    /// This is the single recoverability predicate for both the initial
    /// dial and the reconnect loop.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            Self::DialTimeout { .. } | Self::Timeout { .. } | Self::ConnectionLost => true,
            Self::ConnectionAttemptFailed(status) => status.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if the client was closed on purpose.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClientClosed)
    }

    /// The reader-reported status, if this error carries one.
    pub fn status(&self) -> Option<&LlrpStatus> {
        match self {
            Self::Status(status) | Self::ErrorMessage(status) => Some(status),
            _ => None,
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
