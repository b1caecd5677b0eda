//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use llrp_config::ConfigError;
use llrp_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const REJECTED: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {device} at {address}")]
    #[diagnostic(
        code(llrp::connection_failed),
        help(
            "Check that the reader is powered on and accepts LLRP connections.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed {
        device: String,
        address: String,
        reason: String,
    },

    #[error("Reader connection closed")]
    #[diagnostic(
        code(llrp::session_closed),
        help("The reader hung up while the command was in flight. Try again.")
    )]
    SessionClosed,

    #[error("Reader did not answer within {seconds}s")]
    #[diagnostic(
        code(llrp::timeout),
        help("Raise service.command_timeout_secs or check the reader's load.")
    )]
    Timeout { seconds: u64 },

    // ── Reader ───────────────────────────────────────────────────────
    #[error("Reader rejected the request: {message}")]
    #[diagnostic(code(llrp::rejected))]
    Rejected { message: String },

    #[error("Reader error: {message}")]
    #[diagnostic(code(llrp::reader))]
    Reader { message: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(llrp::validation))]
    Validation { field: String, reason: String },

    #[error("No address for device '{device}'")]
    #[diagnostic(
        code(llrp::unknown_device),
        help(
            "Pass --host (and --port), or add it to the config file:\n\n\
             [devices.{device}]\n\
             host = \"192.168.1.50\""
        )
    )]
    UnknownDevice { device: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(llrp::config),
        help("Run: llrp-fleet config show  to see the effective configuration")
    )]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(llrp::json))]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::SessionClosed => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::UnknownDevice { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            Self::Reader { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => CliError::Validation {
                field: "address".into(),
                reason: message,
            },

            e @ (CoreError::Validation { .. }
            | CoreError::UnknownResource { .. }
            | CoreError::UnknownAction { .. }) => CliError::Validation {
                field: "request".into(),
                reason: e.to_string(),
            },

            CoreError::ConnectionFailed {
                device,
                address,
                reason,
            } => CliError::ConnectionFailed {
                device,
                address,
                reason,
            },

            CoreError::SessionClosed => CliError::SessionClosed,

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Rejected { message, .. } => CliError::Rejected { message },

            CoreError::Protocol { message } | CoreError::Internal(message) => {
                CliError::Reader { message }
            }

            CoreError::Serialization(e) => CliError::Json(e),
        }
    }
}
