// ── Command surface model ──
//
// Types exchanged with the device-management host: command requests,
// typed command values, outbound async events, discovered devices, and
// the protocol-property map a device's address is derived from.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// Protocol name → property name → value, as supplied by the host.
pub type ProtocolProperties = HashMap<String, HashMap<String, String>>;

/// Protocol key that carries a reader's address.
pub const TCP_PROTOCOL: &str = "tcp";

// ── Resources ───────────────────────────────────────────────────────

/// Resource names understood by the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Resource {
    #[strum(serialize = "ReaderCapabilities")]
    ReaderCapabilities,
    #[strum(serialize = "ReaderConfig")]
    ReaderConfig,
    #[strum(serialize = "ReaderEventNotification")]
    ReaderEventNotification,
    #[strum(serialize = "ROSpec")]
    RoSpec,
    #[strum(serialize = "ROSpecID")]
    RoSpecId,
    #[strum(serialize = "AccessSpec")]
    AccessSpec,
    #[strum(serialize = "AccessSpecID")]
    AccessSpecId,
    #[strum(serialize = "ROAccessReport")]
    RoAccessReport,
    #[strum(serialize = "Action")]
    Action,
}

/// Verbs accepted by the `ROSpecID` and `AccessSpecID` write resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Action {
    Delete,
    Enable,
    Disable,
    Start,
    Stop,
}

// ── Requests and values ─────────────────────────────────────────────

/// One resource named by an inbound read or write command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub resource: String,
}

impl CommandRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }
}

/// Typed payload of a [`CommandValue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Uint32(u32),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Uint32(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A value tagged with the resource it belongs to.
///
/// Write parameters are validated both by position and by this tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandValue {
    pub resource: String,
    /// Creation time in nanoseconds since the Unix epoch.
    pub origin: i64,
    pub value: Value,
}

impl CommandValue {
    pub fn new(resource: impl Into<String>, value: Value) -> Self {
        Self {
            resource: resource.into(),
            origin: now_nanos(),
            value,
        }
    }

    pub fn string(resource: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(resource, Value::String(value.into()))
    }

    pub fn uint32(resource: impl Into<String>, value: u32) -> Self {
        Self::new(resource, Value::Uint32(value))
    }

    pub fn as_str(&self) -> Result<&str, CoreError> {
        match &self.value {
            Value::String(s) => Ok(s),
            other => Err(CoreError::validation(format!(
                "parameter {} is not a string (got {other})",
                self.resource
            ))),
        }
    }

    /// Numeric strings are accepted, since hosts often pass every value
    /// as text.
    pub fn as_u32(&self) -> Result<u32, CoreError> {
        match &self.value {
            Value::Uint32(n) => Ok(*n),
            Value::String(s) => s.trim().parse().map_err(|_| {
                CoreError::validation(format!(
                    "parameter {} is not a uint32: {s:?}",
                    self.resource
                ))
            }),
            Value::Bool(_) => Err(CoreError::validation(format!(
                "parameter {} is not a uint32",
                self.resource
            ))),
        }
    }
}

/// Current time as nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

// ── Outbound ────────────────────────────────────────────────────────

/// An asynchronous event pushed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncValues {
    pub device_name: String,
    pub values: Vec<CommandValue>,
}

/// A reader found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub protocols: ProtocolProperties,
    pub description: String,
    pub labels: Vec<String>,
}

// ── Device address ──────────────────────────────────────────────────

/// Where a reader listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Read `protocols["tcp"]["host"]` and `protocols["tcp"]["port"]`.
    pub fn from_protocols(protocols: &ProtocolProperties) -> Result<Self, CoreError> {
        let tcp = protocols
            .get(TCP_PROTOCOL)
            .ok_or_else(|| CoreError::config("missing tcp protocol"))?;

        let host = tcp.get("host").map_or("", |h| h.trim());
        let port = tcp.get("port").map_or("", |p| p.trim());
        if host.is_empty() || port.is_empty() {
            return Err(CoreError::config(format!(
                "tcp missing host or port ({host:?}, {port:?})"
            )));
        }

        let port = port
            .parse()
            .map_err(|_| CoreError::config(format!("tcp port is not a valid port: {port:?}")))?;
        Ok(Self::new(host, port))
    }

    /// The protocol-property map that resolves back to this address.
    pub fn to_protocols(&self) -> ProtocolProperties {
        let tcp = HashMap::from([
            ("host".to_owned(), self.host.clone()),
            ("port".to_owned(), self.port.to_string()),
        ]);
        HashMap::from([(TCP_PROTOCOL.to_owned(), tcp)])
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
