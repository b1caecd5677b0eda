// ── Core error types ──
//
// User-facing errors from llrp-core. Callers never see raw frame or
// parameter decoding failures; the `From<llrp_api::Error>` impl folds
// session-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    /// Bad parameters, wrong parameter tags, malformed JSON payloads.
    /// Never reaches the device.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Unknown resource: {name}")]
    UnknownResource { name: String },

    #[error("unknown {resource} action: {action:?}")]
    UnknownAction { resource: String, action: String },

    /// Missing or malformed device protocol properties.
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {device} at {address}: {reason}")]
    ConnectionFailed {
        device: String,
        address: String,
        reason: String,
    },

    #[error("Reader connection closed")]
    SessionClosed,

    #[error("Reader did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Reader errors ────────────────────────────────────────────────
    /// The reader answered with a failing `LLRPStatus` or `ERROR_MESSAGE`.
    #[error("Reader rejected request: {message}")]
    Rejected { message: String, code: Option<u16> },

    /// The reader sent something the session layer could not make sense of.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Fill in the device and address of a connection failure raised by
    /// the session layer, which knows neither.
    pub(crate) fn on_device(self, name: &str, address: impl std::fmt::Display) -> Self {
        match self {
            Self::ConnectionFailed { reason, .. } => Self::ConnectionFailed {
                device: name.to_owned(),
                address: address.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Returns `true` for errors caused by the caller's input rather than
    /// the reader or the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::UnknownResource { .. }
                | Self::UnknownAction { .. }
                | Self::Config { .. }
                | Self::Serialization(_)
        )
    }
}

// ── Conversion from session-layer errors ─────────────────────────────

impl From<llrp_api::Error> for CoreError {
    fn from(err: llrp_api::Error) -> Self {
        match err {
            llrp_api::Error::Timeout { timeout_secs }
            | llrp_api::Error::DialTimeout { timeout_secs, .. } => {
                CoreError::Timeout { timeout_secs }
            }
            llrp_api::Error::ClientClosed | llrp_api::Error::AlreadyConnected => {
                CoreError::SessionClosed
            }
            llrp_api::Error::ConnectionLost => CoreError::ConnectionFailed {
                device: String::new(),
                address: String::new(),
                reason: "connection lost".into(),
            },
            llrp_api::Error::Io(e) => CoreError::ConnectionFailed {
                device: String::new(),
                address: String::new(),
                reason: e.to_string(),
            },
            llrp_api::Error::ConnectionAttemptFailed(status) => CoreError::ConnectionFailed {
                device: String::new(),
                address: String::new(),
                reason: format!("reader refused connection: {status}"),
            },
            llrp_api::Error::Status(status) | llrp_api::Error::ErrorMessage(status) => {
                CoreError::Rejected {
                    message: if status.description.is_empty() {
                        status.code.to_string()
                    } else {
                        format!("{}: {}", status.code, status.description)
                    },
                    code: Some(status.code.0),
                }
            }
            e @ (llrp_api::Error::UnexpectedResponse { .. }
            | llrp_api::Error::Decode(_)
            | llrp_api::Error::FrameTooLarge { .. }) => CoreError::Protocol {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use llrp_api::{LlrpStatus, StatusCode};

    #[test]
    fn reader_status_becomes_rejection_with_code() {
        let err: CoreError = llrp_api::Error::Status(LlrpStatus::new(
            StatusCode::A_INVALID,
            "ROSpec 9 not found",
        ))
        .into();
        match err {
            CoreError::Rejected { message, code } => {
                assert_eq!(code, Some(300));
                assert!(message.contains("ROSpec 9 not found"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn closed_client_maps_to_session_closed() {
        let err: CoreError = llrp_api::Error::ClientClosed.into();
        assert!(matches!(err, CoreError::SessionClosed));
    }

    #[test]
    fn unknown_action_message_quotes_the_action() {
        let err = CoreError::UnknownAction {
            resource: "ROSpecID".into(),
            action: "Bogus".into(),
        };
        assert_eq!(err.to_string(), r#"unknown ROSpecID action: "Bogus""#);
        assert!(err.is_validation());
    }
}
