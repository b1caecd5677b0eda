//! LLRP parameter handling.
//!
//! Only the parameters the session layer must interpret are decoded here:
//! `LLRPStatus`, the `ConnectionAttemptEvent` inside a reader event
//! notification, and the fixed headers of `ROSpec` / `AccessSpec`.
//! Everything else travels as an opaque [`Parameter`] (type + body bytes).

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::Error;

const TLV_HEADER_LEN: usize = 4;
const TV_FLAG: u16 = 0x8000;
const TYPE_MASK: u16 = 0x03FF;

/// Well-known parameter type numbers.
pub mod kind {
    pub const UTC_TIMESTAMP: u16 = 128;
    pub const UPTIME: u16 = 129;
    pub const RO_SPEC: u16 = 177;
    pub const ACCESS_SPEC: u16 = 207;
    pub const READER_EVENT_NOTIFICATION_DATA: u16 = 246;
    pub const CONNECTION_ATTEMPT_EVENT: u16 = 256;
    pub const LLRP_STATUS: u16 = 287;
    pub const FIELD_ERROR: u16 = 288;
    pub const PARAMETER_ERROR: u16 = 289;
}

// ── Opaque parameter ────────────────────────────────────────────────

/// A TLV parameter whose body is carried verbatim.
///
/// Serializes as `{"Type": 217, "Body": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub kind: u16,
    #[serde(with = "base64_body", default)]
    pub body: Vec<u8>,
}

impl Parameter {
    pub fn new(kind: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind & TYPE_MASK,
            body: body.into(),
        }
    }

    /// Decode this parameter's body as a list of nested TLV parameters.
    pub fn children(&self) -> Result<Vec<Parameter>, Error> {
        decode_parameters(Bytes::copy_from_slice(&self.body))
    }
}

mod base64_body {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Read one TLV header and split off its body.
pub(crate) fn take_tlv(buf: &mut Bytes) -> Result<(u16, Bytes), Error> {
    if buf.remaining() < TLV_HEADER_LEN {
        return Err(Error::decode(format!(
            "truncated parameter header: {} bytes left",
            buf.remaining()
        )));
    }
    let type_field = buf.get_u16();
    if type_field & TV_FLAG != 0 {
        return Err(Error::decode(format!(
            "unexpected TV parameter {} at top level",
            (type_field >> 8) & 0x7F
        )));
    }
    let length = usize::from(buf.get_u16());
    if length < TLV_HEADER_LEN || length - TLV_HEADER_LEN > buf.remaining() {
        return Err(Error::decode(format!(
            "parameter {} declares length {length} with {} body bytes left",
            type_field & TYPE_MASK,
            buf.remaining()
        )));
    }
    let body = buf.split_to(length - TLV_HEADER_LEN);
    Ok((type_field & TYPE_MASK, body))
}

/// Decode a run of TLV parameters until the buffer is exhausted.
pub fn decode_parameters(mut buf: Bytes) -> Result<Vec<Parameter>, Error> {
    let mut params = Vec::new();
    while buf.has_remaining() {
        let (kind, body) = take_tlv(&mut buf)?;
        params.push(Parameter {
            kind,
            body: body.to_vec(),
        });
    }
    Ok(params)
}

/// Write a TLV parameter with the given body.
pub(crate) fn put_tlv(dst: &mut BytesMut, kind: u16, body: &[u8]) -> Result<(), Error> {
    let length = TLV_HEADER_LEN + body.len();
    let wire_length = u16::try_from(length).map_err(|_| Error::FrameTooLarge {
        length,
        limit: usize::from(u16::MAX),
    })?;
    dst.put_u16(kind & TYPE_MASK);
    dst.put_u16(wire_length);
    dst.extend_from_slice(body);
    Ok(())
}

pub fn encode_parameters(params: &[Parameter], dst: &mut BytesMut) -> Result<(), Error> {
    for param in params {
        put_tlv(dst, param.kind, &param.body)?;
    }
    Ok(())
}

// ── LLRPStatus ──────────────────────────────────────────────────────

/// Status code carried in `LLRPStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const M_SUCCESS: Self = Self(0);
    pub const M_PARAMETER_ERROR: Self = Self(100);
    pub const M_FIELD_ERROR: Self = Self(101);
    pub const M_UNEXPECTED_PARAMETER: Self = Self(102);
    pub const M_MISSING_PARAMETER: Self = Self(103);
    pub const M_UNSUPPORTED_MESSAGE: Self = Self(109);
    pub const M_UNSUPPORTED_VERSION: Self = Self(110);
    pub const A_INVALID: Self = Self(300);
    pub const A_OUT_OF_RANGE: Self = Self(301);
    pub const R_DEVICE_ERROR: Self = Self(401);

    pub fn is_success(self) -> bool {
        self == Self::M_SUCCESS
    }

    fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "M_Success",
            100 => "M_ParameterError",
            101 => "M_FieldError",
            102 => "M_UnexpectedParameter",
            103 => "M_MissingParameter",
            109 => "M_UnsupportedMessage",
            110 => "M_UnsupportedVersion",
            300 => "A_Invalid",
            301 => "A_OutOfRange",
            401 => "R_DeviceError",
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// The `LLRPStatus` parameter every response starts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LlrpStatus {
    #[serde(rename = "Status")]
    pub code: StatusCode,
    #[serde(rename = "ErrorDescription", default)]
    pub description: String,
    /// `FieldError` / `ParameterError` details, undecoded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Parameter>,
}

impl LlrpStatus {
    pub fn new(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(StatusCode::M_SUCCESS, "")
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Read the leading `LLRPStatus` parameter from a payload.
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        let (found, mut body) = take_tlv(buf)?;
        if found != kind::LLRP_STATUS {
            return Err(Error::decode(format!(
                "expected LLRPStatus parameter, found type {found}"
            )));
        }
        if body.remaining() < 4 {
            return Err(Error::decode("truncated LLRPStatus"));
        }
        let code = StatusCode(body.get_u16());
        let len = usize::from(body.get_u16());
        if len > body.remaining() {
            return Err(Error::decode("LLRPStatus description overruns parameter"));
        }
        let description = String::from_utf8(body.split_to(len).to_vec())
            .map_err(|e| Error::decode(format!("LLRPStatus description is not UTF-8: {e}")))?;
        let details = decode_parameters(body)?;
        Ok(Self {
            code,
            description,
            details,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        let desc = self.description.as_bytes();
        let desc_len = u16::try_from(desc.len()).map_err(|_| Error::FrameTooLarge {
            length: desc.len(),
            limit: usize::from(u16::MAX),
        })?;
        let mut body = BytesMut::with_capacity(4 + desc.len());
        body.put_u16(self.code.0);
        body.put_u16(desc_len);
        body.extend_from_slice(desc);
        encode_parameters(&self.details, &mut body)?;
        put_tlv(dst, kind::LLRP_STATUS, &body)
    }
}

// ── Connection attempt ──────────────────────────────────────────────

/// Outcome reported in a `ConnectionAttemptEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionAttemptStatus {
    Success,
    ReaderInitiatedConnectionExists,
    ClientInitiatedConnectionExists,
    FailedOther,
    AnotherConnectionAttempted,
    Unknown(u16),
}

impl ConnectionAttemptStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::ReaderInitiatedConnectionExists,
            2 => Self::ClientInitiatedConnectionExists,
            3 => Self::FailedOther,
            4 => Self::AnotherConnectionAttempted,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::ReaderInitiatedConnectionExists => 1,
            Self::ClientInitiatedConnectionExists => 2,
            Self::FailedOther => 3,
            Self::AnotherConnectionAttempted => 4,
            Self::Unknown(code) => code,
        }
    }

    /// A reader busy with another connection may accept us later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ReaderInitiatedConnectionExists | Self::ClientInitiatedConnectionExists
        )
    }
}

impl fmt::Display for ConnectionAttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::ReaderInitiatedConnectionExists => {
                f.write_str("a reader-initiated connection already exists")
            }
            Self::ClientInitiatedConnectionExists => {
                f.write_str("a client-initiated connection already exists")
            }
            Self::FailedOther => f.write_str("failed for an unspecified reason"),
            Self::AnotherConnectionAttempted => f.write_str("another connection was attempted"),
            Self::Unknown(code) => write!(f, "unknown status {code}"),
        }
    }
}
