//! Typed LLRP messages for the supported command set.
//!
//! Every [`Request`] variant names exactly one response message type
//! ([`Request::response_kind`]); [`Response::decode`] only accepts those
//! types. Serde field names follow the LLRP message definitions
//! (`ROSpecID`, `LLRPStatus`, ...) so JSON payloads read like the protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::frame::MessageType;
use crate::param::{
    self, ConnectionAttemptStatus, LlrpStatus, Parameter, decode_parameters, encode_parameters,
    put_tlv, take_tlv,
};

// ── Spec bodies ─────────────────────────────────────────────────────

/// ROSpec lifecycle state as reported by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoSpecState {
    #[default]
    Disabled,
    Inactive,
    Active,
}

impl RoSpecState {
    fn from_wire(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Inactive),
            2 => Ok(Self::Active),
            other => Err(Error::decode(format!("invalid ROSpec state {other}"))),
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Inactive => 1,
            Self::Active => 2,
        }
    }
}

/// Reader operation spec. Boundary, AISpec and report sub-parameters are
/// carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoSpec {
    #[serde(rename = "ROSpecID")]
    pub id: u32,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub current_state: RoSpecState,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl RoSpec {
    fn from_parameter(param: &Parameter) -> Result<Self, Error> {
        let mut body = Bytes::copy_from_slice(&param.body);
        if body.remaining() < 6 {
            return Err(Error::decode("truncated ROSpec"));
        }
        let id = body.get_u32();
        let priority = body.get_u8();
        let current_state = RoSpecState::from_wire(body.get_u8())?;
        Ok(Self {
            id,
            priority,
            current_state,
            parameters: decode_parameters(body)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        let mut body = BytesMut::new();
        body.put_u32(self.id);
        body.put_u8(self.priority);
        body.put_u8(self.current_state.to_wire());
        encode_parameters(&self.parameters, &mut body)?;
        put_tlv(dst, param::kind::RO_SPEC, &body)
    }
}

/// Access operation spec bound to an antenna and (optionally) an ROSpec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessSpec {
    #[serde(rename = "AccessSpecID")]
    pub id: u32,
    #[serde(rename = "AntennaID", default)]
    pub antenna_id: u16,
    #[serde(rename = "ProtocolID", default = "default_protocol_id")]
    pub protocol_id: u8,
    #[serde(default)]
    pub is_active: bool,
    #[serde(rename = "ROSpecID", default)]
    pub ro_spec_id: u32,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// EPCGlobal Class 1 Gen 2.
fn default_protocol_id() -> u8 {
    1
}

impl AccessSpec {
    fn from_parameter(param: &Parameter) -> Result<Self, Error> {
        let mut body = Bytes::copy_from_slice(&param.body);
        if body.remaining() < 12 {
            return Err(Error::decode("truncated AccessSpec"));
        }
        let id = body.get_u32();
        let antenna_id = body.get_u16();
        let protocol_id = body.get_u8();
        let is_active = body.get_u8() & 0x80 != 0;
        let ro_spec_id = body.get_u32();
        Ok(Self {
            id,
            antenna_id,
            protocol_id,
            is_active,
            ro_spec_id,
            parameters: decode_parameters(body)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        let mut body = BytesMut::new();
        body.put_u32(self.id);
        body.put_u16(self.antenna_id);
        body.put_u8(self.protocol_id);
        body.put_u8(if self.is_active { 0x80 } else { 0 });
        body.put_u32(self.ro_spec_id);
        encode_parameters(&self.parameters, &mut body)?;
        put_tlv(dst, param::kind::ACCESS_SPEC, &body)
    }
}

// ── Request bodies ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetReaderCapabilities {
    /// 0 requests everything.
    #[serde(default)]
    pub requested_data: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetReaderConfig {
    #[serde(rename = "AntennaID", default)]
    pub antenna_id: u16,
    #[serde(default)]
    pub requested_data: u8,
    #[serde(rename = "GPIPortNum", default)]
    pub gpi_port_num: u16,
    #[serde(rename = "GPOPortNum", default)]
    pub gpo_port_num: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetReaderConfig {
    #[serde(default)]
    pub reset_to_factory_defaults: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRoSpec {
    #[serde(rename = "ROSpec")]
    pub ro_spec: RoSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAccessSpec {
    #[serde(rename = "AccessSpec")]
    pub access_spec: AccessSpec,
}

// ── Request ─────────────────────────────────────────────────────────

/// A client-to-reader request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetReaderCapabilities(GetReaderCapabilities),
    GetReaderConfig(GetReaderConfig),
    SetReaderConfig(SetReaderConfig),
    AddRoSpec(AddRoSpec),
    DeleteRoSpec { ro_spec_id: u32 },
    StartRoSpec { ro_spec_id: u32 },
    StopRoSpec { ro_spec_id: u32 },
    EnableRoSpec { ro_spec_id: u32 },
    DisableRoSpec { ro_spec_id: u32 },
    GetRoSpecs,
    AddAccessSpec(AddAccessSpec),
    DeleteAccessSpec { access_spec_id: u32 },
    EnableAccessSpec { access_spec_id: u32 },
    DisableAccessSpec { access_spec_id: u32 },
    GetAccessSpecs,
    CloseConnection,
}

impl Request {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::GetReaderCapabilities(_) => MessageType::GET_READER_CAPABILITIES,
            Self::GetReaderConfig(_) => MessageType::GET_READER_CONFIG,
            Self::SetReaderConfig(_) => MessageType::SET_READER_CONFIG,
            Self::AddRoSpec(_) => MessageType::ADD_ROSPEC,
            Self::DeleteRoSpec { .. } => MessageType::DELETE_ROSPEC,
            Self::StartRoSpec { .. } => MessageType::START_ROSPEC,
            Self::StopRoSpec { .. } => MessageType::STOP_ROSPEC,
            Self::EnableRoSpec { .. } => MessageType::ENABLE_ROSPEC,
            Self::DisableRoSpec { .. } => MessageType::DISABLE_ROSPEC,
            Self::GetRoSpecs => MessageType::GET_ROSPECS,
            Self::AddAccessSpec(_) => MessageType::ADD_ACCESSSPEC,
            Self::DeleteAccessSpec { .. } => MessageType::DELETE_ACCESSSPEC,
            Self::EnableAccessSpec { .. } => MessageType::ENABLE_ACCESSSPEC,
            Self::DisableAccessSpec { .. } => MessageType::DISABLE_ACCESSSPEC,
            Self::GetAccessSpecs => MessageType::GET_ACCESSSPECS,
            Self::CloseConnection => MessageType::CLOSE_CONNECTION,
        }
    }

    /// The only message type that completes this request.
    pub fn response_kind(&self) -> MessageType {
        match self {
            Self::GetReaderCapabilities(_) => MessageType::GET_READER_CAPABILITIES_RESPONSE,
            Self::GetReaderConfig(_) => MessageType::GET_READER_CONFIG_RESPONSE,
            Self::SetReaderConfig(_) => MessageType::SET_READER_CONFIG_RESPONSE,
            Self::AddRoSpec(_) => MessageType::ADD_ROSPEC_RESPONSE,
            Self::DeleteRoSpec { .. } => MessageType::DELETE_ROSPEC_RESPONSE,
            Self::StartRoSpec { .. } => MessageType::START_ROSPEC_RESPONSE,
            Self::StopRoSpec { .. } => MessageType::STOP_ROSPEC_RESPONSE,
            Self::EnableRoSpec { .. } => MessageType::ENABLE_ROSPEC_RESPONSE,
            Self::DisableRoSpec { .. } => MessageType::DISABLE_ROSPEC_RESPONSE,
            Self::GetRoSpecs => MessageType::GET_ROSPECS_RESPONSE,
            Self::AddAccessSpec(_) => MessageType::ADD_ACCESSSPEC_RESPONSE,
            Self::DeleteAccessSpec { .. } => MessageType::DELETE_ACCESSSPEC_RESPONSE,
            Self::EnableAccessSpec { .. } => MessageType::ENABLE_ACCESSSPEC_RESPONSE,
            Self::DisableAccessSpec { .. } => MessageType::DISABLE_ACCESSSPEC_RESPONSE,
            Self::GetAccessSpecs => MessageType::GET_ACCESSSPECS_RESPONSE,
            Self::CloseConnection => MessageType::CLOSE_CONNECTION_RESPONSE,
        }
    }

    pub fn encode_payload(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        match self {
            Self::GetReaderCapabilities(req) => buf.put_u8(req.requested_data),
            Self::GetReaderConfig(req) => {
                buf.put_u16(req.antenna_id);
                buf.put_u8(req.requested_data);
                buf.put_u16(req.gpi_port_num);
                buf.put_u16(req.gpo_port_num);
            }
            Self::SetReaderConfig(req) => {
                buf.put_u8(if req.reset_to_factory_defaults { 0x80 } else { 0 });
                encode_parameters(&req.parameters, &mut buf)?;
            }
            Self::AddRoSpec(req) => req.ro_spec.encode(&mut buf)?,
            Self::DeleteRoSpec { ro_spec_id }
            | Self::StartRoSpec { ro_spec_id }
            | Self::StopRoSpec { ro_spec_id }
            | Self::EnableRoSpec { ro_spec_id }
            | Self::DisableRoSpec { ro_spec_id } => buf.put_u32(*ro_spec_id),
            Self::AddAccessSpec(req) => req.access_spec.encode(&mut buf)?,
            Self::DeleteAccessSpec { access_spec_id }
            | Self::EnableAccessSpec { access_spec_id }
            | Self::DisableAccessSpec { access_spec_id } => buf.put_u32(*access_spec_id),
            Self::GetRoSpecs | Self::GetAccessSpecs | Self::CloseConnection => {}
        }
        Ok(buf.freeze())
    }

    /// Parse a request frame, as a reader would.
    pub fn decode(kind: MessageType, mut payload: Bytes) -> Result<Self, Error> {
        let need = |payload: &Bytes, n: usize| {
            if payload.remaining() < n {
                Err(Error::decode(format!("{kind} payload is truncated")))
            } else {
                Ok(())
            }
        };
        Ok(match kind {
            MessageType::GET_READER_CAPABILITIES => {
                need(&payload, 1)?;
                Self::GetReaderCapabilities(GetReaderCapabilities {
                    requested_data: payload.get_u8(),
                })
            }
            MessageType::GET_READER_CONFIG => {
                need(&payload, 7)?;
                Self::GetReaderConfig(GetReaderConfig {
                    antenna_id: payload.get_u16(),
                    requested_data: payload.get_u8(),
                    gpi_port_num: payload.get_u16(),
                    gpo_port_num: payload.get_u16(),
                })
            }
            MessageType::SET_READER_CONFIG => {
                need(&payload, 1)?;
                let reset_to_factory_defaults = payload.get_u8() & 0x80 != 0;
                Self::SetReaderConfig(SetReaderConfig {
                    reset_to_factory_defaults,
                    parameters: decode_parameters(payload)?,
                })
            }
            MessageType::ADD_ROSPEC => {
                let spec = single_parameter(payload, param::kind::RO_SPEC)?;
                Self::AddRoSpec(AddRoSpec {
                    ro_spec: RoSpec::from_parameter(&spec)?,
                })
            }
            MessageType::ADD_ACCESSSPEC => {
                let spec = single_parameter(payload, param::kind::ACCESS_SPEC)?;
                Self::AddAccessSpec(AddAccessSpec {
                    access_spec: AccessSpec::from_parameter(&spec)?,
                })
            }
            MessageType::DELETE_ROSPEC
            | MessageType::START_ROSPEC
            | MessageType::STOP_ROSPEC
            | MessageType::ENABLE_ROSPEC
            | MessageType::DISABLE_ROSPEC
            | MessageType::DELETE_ACCESSSPEC
            | MessageType::ENABLE_ACCESSSPEC
            | MessageType::DISABLE_ACCESSSPEC => {
                need(&payload, 4)?;
                let id = payload.get_u32();
                match kind {
                    MessageType::DELETE_ROSPEC => Self::DeleteRoSpec { ro_spec_id: id },
                    MessageType::START_ROSPEC => Self::StartRoSpec { ro_spec_id: id },
                    MessageType::STOP_ROSPEC => Self::StopRoSpec { ro_spec_id: id },
                    MessageType::ENABLE_ROSPEC => Self::EnableRoSpec { ro_spec_id: id },
                    MessageType::DISABLE_ROSPEC => Self::DisableRoSpec { ro_spec_id: id },
                    MessageType::DELETE_ACCESSSPEC => Self::DeleteAccessSpec { access_spec_id: id },
                    MessageType::ENABLE_ACCESSSPEC => Self::EnableAccessSpec { access_spec_id: id },
                    _ => Self::DisableAccessSpec { access_spec_id: id },
                }
            }
            MessageType::GET_ROSPECS => Self::GetRoSpecs,
            MessageType::GET_ACCESSSPECS => Self::GetAccessSpecs,
            MessageType::CLOSE_CONNECTION => Self::CloseConnection,
            other => return Err(Error::decode(format!("{other} is not a supported request"))),
        })
    }
}

fn single_parameter(mut payload: Bytes, expected: u16) -> Result<Parameter, Error> {
    let (found, body) = take_tlv(&mut payload)?;
    if found != expected {
        return Err(Error::decode(format!(
            "expected parameter type {expected}, found {found}"
        )));
    }
    Ok(Parameter::new(found, body.to_vec()))
}

// ── Responses ───────────────────────────────────────────────────────

/// Response that carries nothing but its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "LLRPStatus")]
    pub status: LlrpStatus,
}

/// Response with opaque data parameters after the status
/// (capabilities, reader configuration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParametersResponse {
    #[serde(rename = "LLRPStatus")]
    pub status: LlrpStatus,
    #[serde(rename = "Parameters", default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRoSpecsResponse {
    #[serde(rename = "LLRPStatus")]
    pub status: LlrpStatus,
    #[serde(rename = "ROSpecs", default)]
    pub ro_specs: Vec<RoSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAccessSpecsResponse {
    #[serde(rename = "LLRPStatus")]
    pub status: LlrpStatus,
    #[serde(rename = "AccessSpecs", default)]
    pub access_specs: Vec<AccessSpec>,
}

/// A reader-to-client response. Serializes as the bare response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    GetReaderCapabilities(ParametersResponse),
    GetReaderConfig(ParametersResponse),
    SetReaderConfig(StatusResponse),
    AddRoSpec(StatusResponse),
    DeleteRoSpec(StatusResponse),
    StartRoSpec(StatusResponse),
    StopRoSpec(StatusResponse),
    EnableRoSpec(StatusResponse),
    DisableRoSpec(StatusResponse),
    GetRoSpecs(GetRoSpecsResponse),
    AddAccessSpec(StatusResponse),
    DeleteAccessSpec(StatusResponse),
    EnableAccessSpec(StatusResponse),
    DisableAccessSpec(StatusResponse),
    GetAccessSpecs(GetAccessSpecsResponse),
    CloseConnection(StatusResponse),
}

impl Response {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::GetReaderCapabilities(_) => MessageType::GET_READER_CAPABILITIES_RESPONSE,
            Self::GetReaderConfig(_) => MessageType::GET_READER_CONFIG_RESPONSE,
            Self::SetReaderConfig(_) => MessageType::SET_READER_CONFIG_RESPONSE,
            Self::AddRoSpec(_) => MessageType::ADD_ROSPEC_RESPONSE,
            Self::DeleteRoSpec(_) => MessageType::DELETE_ROSPEC_RESPONSE,
            Self::StartRoSpec(_) => MessageType::START_ROSPEC_RESPONSE,
            Self::StopRoSpec(_) => MessageType::STOP_ROSPEC_RESPONSE,
            Self::EnableRoSpec(_) => MessageType::ENABLE_ROSPEC_RESPONSE,
            Self::DisableRoSpec(_) => MessageType::DISABLE_ROSPEC_RESPONSE,
            Self::GetRoSpecs(_) => MessageType::GET_ROSPECS_RESPONSE,
            Self::AddAccessSpec(_) => MessageType::ADD_ACCESSSPEC_RESPONSE,
            Self::DeleteAccessSpec(_) => MessageType::DELETE_ACCESSSPEC_RESPONSE,
            Self::EnableAccessSpec(_) => MessageType::ENABLE_ACCESSSPEC_RESPONSE,
            Self::DisableAccessSpec(_) => MessageType::DISABLE_ACCESSSPEC_RESPONSE,
            Self::GetAccessSpecs(_) => MessageType::GET_ACCESSSPECS_RESPONSE,
            Self::CloseConnection(_) => MessageType::CLOSE_CONNECTION_RESPONSE,
        }
    }

    pub fn status(&self) -> &LlrpStatus {
        match self {
            Self::GetReaderCapabilities(r) | Self::GetReaderConfig(r) => &r.status,
            Self::GetRoSpecs(r) => &r.status,
            Self::GetAccessSpecs(r) => &r.status,
            Self::SetReaderConfig(r)
            | Self::AddRoSpec(r)
            | Self::DeleteRoSpec(r)
            | Self::StartRoSpec(r)
            | Self::StopRoSpec(r)
            | Self::EnableRoSpec(r)
            | Self::DisableRoSpec(r)
            | Self::AddAccessSpec(r)
            | Self::DeleteAccessSpec(r)
            | Self::EnableAccessSpec(r)
            | Self::DisableAccessSpec(r)
            | Self::CloseConnection(r) => &r.status,
        }
    }

    /// A success response of the type paired with `request`.
    pub fn success_for(request: &Request) -> Self {
        let status = StatusResponse {
            status: LlrpStatus::success(),
        };
        match request {
            Request::GetReaderCapabilities(_) => Self::GetReaderCapabilities(ParametersResponse {
                status: status.status,
                parameters: Vec::new(),
            }),
            Request::GetReaderConfig(_) => Self::GetReaderConfig(ParametersResponse {
                status: status.status,
                parameters: Vec::new(),
            }),
            Request::GetRoSpecs => Self::GetRoSpecs(GetRoSpecsResponse {
                status: status.status,
                ro_specs: Vec::new(),
            }),
            Request::GetAccessSpecs => Self::GetAccessSpecs(GetAccessSpecsResponse {
                status: status.status,
                access_specs: Vec::new(),
            }),
            Request::SetReaderConfig(_) => Self::SetReaderConfig(status),
            Request::AddRoSpec(_) => Self::AddRoSpec(status),
            Request::DeleteRoSpec { .. } => Self::DeleteRoSpec(status),
            Request::StartRoSpec { .. } => Self::StartRoSpec(status),
            Request::StopRoSpec { .. } => Self::StopRoSpec(status),
            Request::EnableRoSpec { .. } => Self::EnableRoSpec(status),
            Request::DisableRoSpec { .. } => Self::DisableRoSpec(status),
            Request::AddAccessSpec(_) => Self::AddAccessSpec(status),
            Request::DeleteAccessSpec { .. } => Self::DeleteAccessSpec(status),
            Request::EnableAccessSpec { .. } => Self::EnableAccessSpec(status),
            Request::DisableAccessSpec { .. } => Self::DisableAccessSpec(status),
            Request::CloseConnection => Self::CloseConnection(status),
        }
    }

    pub fn decode(kind: MessageType, mut payload: Bytes) -> Result<Self, Error> {
        let status = LlrpStatus::decode(&mut payload)?;
        let plain = StatusResponse {
            status: status.clone(),
        };
        Ok(match kind {
            MessageType::GET_READER_CAPABILITIES_RESPONSE => {
                Self::GetReaderCapabilities(ParametersResponse {
                    status,
                    parameters: decode_parameters(payload)?,
                })
            }
            MessageType::GET_READER_CONFIG_RESPONSE => Self::GetReaderConfig(ParametersResponse {
                status,
                parameters: decode_parameters(payload)?,
            }),
            MessageType::GET_ROSPECS_RESPONSE => Self::GetRoSpecs(GetRoSpecsResponse {
                status,
                ro_specs: decode_parameters(payload)?
                    .iter()
                    .filter(|p| p.kind == param::kind::RO_SPEC)
                    .map(RoSpec::from_parameter)
                    .collect::<Result<_, _>>()?,
            }),
            MessageType::GET_ACCESSSPECS_RESPONSE => Self::GetAccessSpecs(GetAccessSpecsResponse {
                status,
                access_specs: decode_parameters(payload)?
                    .iter()
                    .filter(|p| p.kind == param::kind::ACCESS_SPEC)
                    .map(AccessSpec::from_parameter)
                    .collect::<Result<_, _>>()?,
            }),
            MessageType::SET_READER_CONFIG_RESPONSE => Self::SetReaderConfig(plain),
            MessageType::ADD_ROSPEC_RESPONSE => Self::AddRoSpec(plain),
            MessageType::DELETE_ROSPEC_RESPONSE => Self::DeleteRoSpec(plain),
            MessageType::START_ROSPEC_RESPONSE => Self::StartRoSpec(plain),
            MessageType::STOP_ROSPEC_RESPONSE => Self::StopRoSpec(plain),
            MessageType::ENABLE_ROSPEC_RESPONSE => Self::EnableRoSpec(plain),
            MessageType::DISABLE_ROSPEC_RESPONSE => Self::DisableRoSpec(plain),
            MessageType::ADD_ACCESSSPEC_RESPONSE => Self::AddAccessSpec(plain),
            MessageType::DELETE_ACCESSSPEC_RESPONSE => Self::DeleteAccessSpec(plain),
            MessageType::ENABLE_ACCESSSPEC_RESPONSE => Self::EnableAccessSpec(plain),
            MessageType::DISABLE_ACCESSSPEC_RESPONSE => Self::DisableAccessSpec(plain),
            MessageType::CLOSE_CONNECTION_RESPONSE => Self::CloseConnection(plain),
            other => return Err(Error::decode(format!("{other} is not a supported response"))),
        })
    }

    pub fn encode_payload(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.status().encode(&mut buf)?;
        match self {
            Self::GetReaderCapabilities(r) | Self::GetReaderConfig(r) => {
                encode_parameters(&r.parameters, &mut buf)?;
            }
            Self::GetRoSpecs(r) => {
                for spec in &r.ro_specs {
                    spec.encode(&mut buf)?;
                }
            }
            Self::GetAccessSpecs(r) => {
                for spec in &r.access_specs {
                    spec.encode(&mut buf)?;
                }
            }
            _ => {}
        }
        Ok(buf.freeze())
    }
}

// ── Unsolicited ─────────────────────────────────────────────────────

/// `READER_EVENT_NOTIFICATION`: the children of its
/// `ReaderEventNotificationData` parameter (timestamp + events).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderEventNotification {
    #[serde(rename = "ReaderEventNotificationData")]
    pub data: Vec<Parameter>,
}

impl ReaderEventNotification {
    pub fn decode(mut payload: Bytes) -> Result<Self, Error> {
        let (found, body) = take_tlv(&mut payload)?;
        if found != param::kind::READER_EVENT_NOTIFICATION_DATA {
            return Err(Error::decode(format!(
                "expected ReaderEventNotificationData, found parameter type {found}"
            )));
        }
        Ok(Self {
            data: decode_parameters(body)?,
        })
    }

    pub fn encode_payload(&self) -> Result<Bytes, Error> {
        let mut body = BytesMut::new();
        encode_parameters(&self.data, &mut body)?;
        let mut buf = BytesMut::new();
        put_tlv(&mut buf, param::kind::READER_EVENT_NOTIFICATION_DATA, &body)?;
        Ok(buf.freeze())
    }

    /// The notification a reader sends first on every new connection.
    pub fn connection_attempt(status: ConnectionAttemptStatus, timestamp_micros: u64) -> Self {
        Self {
            data: vec![
                Parameter::new(param::kind::UTC_TIMESTAMP, timestamp_micros.to_be_bytes()),
                Parameter::new(
                    param::kind::CONNECTION_ATTEMPT_EVENT,
                    status.code().to_be_bytes(),
                ),
            ],
        }
    }

    /// Status of the `ConnectionAttemptEvent`, if this notification has one.
    pub fn connection_attempt_status(&self) -> Option<ConnectionAttemptStatus> {
        self.data
            .iter()
            .find(|p| p.kind == param::kind::CONNECTION_ATTEMPT_EVENT)
            .and_then(|p| p.body.get(..2))
            .map(|code| ConnectionAttemptStatus::from_code(u16::from_be_bytes([code[0], code[1]])))
    }
}

/// `RO_ACCESS_REPORT`: tag report data and any other report parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoAccessReport {
    #[serde(rename = "Parameters", default)]
    pub parameters: Vec<Parameter>,
}

impl RoAccessReport {
    pub fn decode(payload: Bytes) -> Result<Self, Error> {
        Ok(Self {
            parameters: decode_parameters(payload)?,
        })
    }

    pub fn encode_payload(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        encode_parameters(&self.parameters, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// `ERROR_MESSAGE`: a reader's answer to a message it could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(rename = "LLRPStatus")]
    pub status: LlrpStatus,
}

impl ErrorMessage {
    pub fn decode(mut payload: Bytes) -> Result<Self, Error> {
        Ok(Self {
            status: LlrpStatus::decode(&mut payload)?,
        })
    }

    pub fn encode_payload(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.status.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::param::StatusCode;
    use pretty_assertions::assert_eq;

    fn sample_ro_spec() -> RoSpec {
        RoSpec {
            id: 42,
            priority: 0,
            current_state: RoSpecState::Disabled,
            parameters: vec![Parameter::new(178, vec![0, 0, 0, 0])],
        }
    }

    #[test]
    fn every_request_pairs_with_its_protocol_response() {
        let requests = [
            Request::GetReaderCapabilities(GetReaderCapabilities::default()),
            Request::GetReaderConfig(GetReaderConfig::default()),
            Request::SetReaderConfig(SetReaderConfig::default()),
            Request::StartRoSpec { ro_spec_id: 1 },
            Request::GetRoSpecs,
            Request::DisableAccessSpec { access_spec_id: 9 },
            Request::CloseConnection,
        ];
        for request in requests {
            assert_eq!(request.kind().response_type(), Some(request.response_kind()));
            assert_eq!(Response::success_for(&request).kind(), request.response_kind());
        }
    }

    #[test]
    fn add_rospec_survives_the_wire() {
        let request = Request::AddRoSpec(AddRoSpec {
            ro_spec: sample_ro_spec(),
        });
        let payload = request.encode_payload().unwrap();
        assert_eq!(Request::decode(request.kind(), payload).unwrap(), request);
    }

    #[test]
    fn start_rospec_payload_is_the_bare_id() {
        let payload = Request::StartRoSpec { ro_spec_id: 42 }.encode_payload().unwrap();
        assert_eq!(&payload[..], &[0, 0, 0, 42]);
    }

    #[test]
    fn rospec_json_uses_protocol_field_names() {
        let json = serde_json::json!({
            "ROSpecID": 7,
            "Priority": 1,
            "CurrentState": "Inactive",
        });
        let spec: RoSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.id, 7);
        assert_eq!(spec.current_state, RoSpecState::Inactive);
        assert!(spec.parameters.is_empty());
    }

    #[test]
    fn get_rospecs_response_decodes_spec_headers() {
        let response = Response::GetRoSpecs(GetRoSpecsResponse {
            status: LlrpStatus::success(),
            ro_specs: vec![sample_ro_spec()],
        });
        let payload = response.encode_payload().unwrap();
        let decoded = Response::decode(MessageType::GET_ROSPECS_RESPONSE, payload).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn response_serializes_as_bare_body() {
        let response = Response::StartRoSpec(StatusResponse {
            status: LlrpStatus::success(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "LLRPStatus": { "Status": 0, "ErrorDescription": "" } })
        );
    }

    #[test]
    fn failing_status_is_preserved() {
        let response = Response::DeleteRoSpec(StatusResponse {
            status: LlrpStatus::new(StatusCode::A_INVALID, "no such ROSpec"),
        });
        let payload = response.encode_payload().unwrap();
        let decoded = Response::decode(MessageType::DELETE_ROSPEC_RESPONSE, payload).unwrap();
        assert!(!decoded.status().is_success());
        assert_eq!(decoded.status().description, "no such ROSpec");
    }

    #[test]
    fn connection_attempt_status_is_found_in_notification() {
        let note =
            ReaderEventNotification::connection_attempt(ConnectionAttemptStatus::Success, 1_000);
        let decoded = ReaderEventNotification::decode(note.encode_payload().unwrap()).unwrap();
        assert_eq!(
            decoded.connection_attempt_status(),
            Some(ConnectionAttemptStatus::Success)
        );
    }

    #[test]
    fn notification_without_connection_event_has_no_status() {
        let note = ReaderEventNotification {
            data: vec![Parameter::new(param::kind::UTC_TIMESTAMP, 5u64.to_be_bytes())],
        };
        assert_eq!(note.connection_attempt_status(), None);
    }

    #[test]
    fn request_types_cannot_be_decoded_as_responses() {
        let mut buf = BytesMut::new();
        LlrpStatus::success().encode(&mut buf).unwrap();
        assert!(Response::decode(MessageType::START_ROSPEC, buf.freeze()).is_err());
    }
}
