//! LLRP message framing.
//!
//! Every LLRP message starts with a fixed 10-byte header:
//!
//! ```text
//!  0                   1                   2                   3
//! +-----+-----+-------------------+-------------------------------+
//! | rsv | ver |   message type    |        message length ...     |
//! +-----+-----+-------------------+-------------------------------+
//! |  ... length (cont.)           |        message id ...         |
//! +-------------------------------+-------------------------------+
//! |  ... id (cont.)               |  payload ...
//! ```
//!
//! The length covers the header itself. [`LlrpCodec`] plugs into
//! `tokio_util::codec::{FramedRead, FramedWrite}`.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 10;

/// Protocol version written into outbound headers (LLRP 1.0.1).
pub const PROTOCOL_VERSION: u8 = 1;

/// Default upper bound for a single inbound frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TYPE_MASK: u16 = 0x03FF;
const VERSION_MASK: u16 = 0x0007;

// ── Message type ────────────────────────────────────────────────────

/// 10-bit LLRP message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(u16);

impl MessageType {
    pub const GET_READER_CAPABILITIES: Self = Self(1);
    pub const GET_READER_CONFIG: Self = Self(2);
    pub const SET_READER_CONFIG: Self = Self(3);
    pub const CLOSE_CONNECTION_RESPONSE: Self = Self(4);
    pub const GET_READER_CAPABILITIES_RESPONSE: Self = Self(11);
    pub const GET_READER_CONFIG_RESPONSE: Self = Self(12);
    pub const SET_READER_CONFIG_RESPONSE: Self = Self(13);
    pub const CLOSE_CONNECTION: Self = Self(14);
    pub const ADD_ROSPEC: Self = Self(20);
    pub const DELETE_ROSPEC: Self = Self(21);
    pub const START_ROSPEC: Self = Self(22);
    pub const STOP_ROSPEC: Self = Self(23);
    pub const ENABLE_ROSPEC: Self = Self(24);
    pub const DISABLE_ROSPEC: Self = Self(25);
    pub const GET_ROSPECS: Self = Self(26);
    pub const ADD_ROSPEC_RESPONSE: Self = Self(30);
    pub const DELETE_ROSPEC_RESPONSE: Self = Self(31);
    pub const START_ROSPEC_RESPONSE: Self = Self(32);
    pub const STOP_ROSPEC_RESPONSE: Self = Self(33);
    pub const ENABLE_ROSPEC_RESPONSE: Self = Self(34);
    pub const DISABLE_ROSPEC_RESPONSE: Self = Self(35);
    pub const GET_ROSPECS_RESPONSE: Self = Self(36);
    pub const ADD_ACCESSSPEC: Self = Self(40);
    pub const DELETE_ACCESSSPEC: Self = Self(41);
    pub const ENABLE_ACCESSSPEC: Self = Self(42);
    pub const DISABLE_ACCESSSPEC: Self = Self(43);
    pub const GET_ACCESSSPECS: Self = Self(44);
    pub const ADD_ACCESSSPEC_RESPONSE: Self = Self(50);
    pub const DELETE_ACCESSSPEC_RESPONSE: Self = Self(51);
    pub const ENABLE_ACCESSSPEC_RESPONSE: Self = Self(52);
    pub const DISABLE_ACCESSSPEC_RESPONSE: Self = Self(53);
    pub const GET_ACCESSSPECS_RESPONSE: Self = Self(54);
    pub const GET_REPORT: Self = Self(60);
    pub const RO_ACCESS_REPORT: Self = Self(61);
    pub const KEEPALIVE: Self = Self(62);
    pub const READER_EVENT_NOTIFICATION: Self = Self(63);
    pub const ENABLE_EVENTS_AND_REPORTS: Self = Self(64);
    pub const KEEPALIVE_ACK: Self = Self(72);
    pub const ERROR_MESSAGE: Self = Self(100);
    pub const CUSTOM_MESSAGE: Self = Self(1023);

    /// Build a message type, discarding bits above the 10-bit field.
    pub const fn new(value: u16) -> Self {
        Self(value & TYPE_MASK)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// The response type a reader answers this request type with.
    pub const fn response_type(self) -> Option<Self> {
        match self.0 {
            1..=3 | 20..=26 | 40..=44 => Some(Self(self.0 + 10)),
            14 => Some(Self::CLOSE_CONNECTION_RESPONSE),
            _ => None,
        }
    }

    /// Message types a reader sends without being asked.
    pub const fn is_unsolicited(self) -> bool {
        matches!(self.0, 61..=63)
    }

    pub const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            1 => "GET_READER_CAPABILITIES",
            2 => "GET_READER_CONFIG",
            3 => "SET_READER_CONFIG",
            4 => "CLOSE_CONNECTION_RESPONSE",
            11 => "GET_READER_CAPABILITIES_RESPONSE",
            12 => "GET_READER_CONFIG_RESPONSE",
            13 => "SET_READER_CONFIG_RESPONSE",
            14 => "CLOSE_CONNECTION",
            20 => "ADD_ROSPEC",
            21 => "DELETE_ROSPEC",
            22 => "START_ROSPEC",
            23 => "STOP_ROSPEC",
            24 => "ENABLE_ROSPEC",
            25 => "DISABLE_ROSPEC",
            26 => "GET_ROSPECS",
            30 => "ADD_ROSPEC_RESPONSE",
            31 => "DELETE_ROSPEC_RESPONSE",
            32 => "START_ROSPEC_RESPONSE",
            33 => "STOP_ROSPEC_RESPONSE",
            34 => "ENABLE_ROSPEC_RESPONSE",
            35 => "DISABLE_ROSPEC_RESPONSE",
            36 => "GET_ROSPECS_RESPONSE",
            40 => "ADD_ACCESSSPEC",
            41 => "DELETE_ACCESSSPEC",
            42 => "ENABLE_ACCESSSPEC",
            43 => "DISABLE_ACCESSSPEC",
            44 => "GET_ACCESSSPECS",
            50 => "ADD_ACCESSSPEC_RESPONSE",
            51 => "DELETE_ACCESSSPEC_RESPONSE",
            52 => "ENABLE_ACCESSSPEC_RESPONSE",
            53 => "DISABLE_ACCESSSPEC_RESPONSE",
            54 => "GET_ACCESSSPECS_RESPONSE",
            60 => "GET_REPORT",
            61 => "RO_ACCESS_REPORT",
            62 => "KEEPALIVE",
            63 => "READER_EVENT_NOTIFICATION",
            64 => "ENABLE_EVENTS_AND_REPORTS",
            72 => "KEEPALIVE_ACK",
            100 => "ERROR_MESSAGE",
            1023 => "CUSTOM_MESSAGE",
            _ => return None,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "MessageType({})", self.0),
        }
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// One framed LLRP message with its payload left undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u32,
    pub kind: MessageType,
    pub version: u8,
    pub payload: Bytes,
}

impl Message {
    pub fn new(id: u32, kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            kind,
            version: PROTOCOL_VERSION,
            payload: payload.into(),
        }
    }
}

// ── Codec ───────────────────────────────────────────────────────────

/// Length-prefixed LLRP codec.
#[derive(Debug, Clone)]
pub struct LlrpCodec {
    max_frame_len: usize,
}

impl LlrpCodec {
    pub fn new() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for LlrpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LlrpCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let type_field = header.get_u16();
        let length = usize::try_from(header.get_u32()).map_err(|_| Error::decode("frame length overflow"))?;

        if length < HEADER_LEN {
            return Err(Error::decode(format!(
                "frame length {length} is shorter than the {HEADER_LEN}-byte header"
            )));
        }
        if length > self.max_frame_len {
            return Err(Error::FrameTooLarge {
                length,
                limit: self.max_frame_len,
            });
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(length);
        frame.advance(6);
        let id = frame.get_u32();
        let version = u8::try_from((type_field >> 10) & VERSION_MASK).unwrap_or(PROTOCOL_VERSION);

        Ok(Some(Message {
            id,
            kind: MessageType::new(type_field),
            version,
            payload: frame.freeze(),
        }))
    }
}

impl Encoder<Message> for LlrpCodec {
    type Error = Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), Error> {
        let length = HEADER_LEN + msg.payload.len();
        let wire_length = u32::try_from(length).map_err(|_| Error::FrameTooLarge {
            length,
            limit: self.max_frame_len,
        })?;

        dst.reserve(length);
        dst.put_u16(((u16::from(msg.version) & VERSION_MASK) << 10) | msg.kind.value());
        dst.put_u32(wire_length);
        dst.put_u32(msg.id);
        dst.extend_from_slice(&msg.payload);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode(msg: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        LlrpCodec::new().encode(msg, &mut buf).unwrap();
        buf
    }

    #[test]
    fn header_layout_matches_wire_format() {
        let buf = encode(Message::new(7, MessageType::GET_ROSPECS, Bytes::new()));
        // version 1, type 26 => 0b000_001_0000011010
        assert_eq!(&buf[..], &[0x04, 0x1A, 0, 0, 0, 10, 0, 0, 0, 7]);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let full = encode(Message::new(1, MessageType::KEEPALIVE, vec![1, 2, 3]));
        let mut partial = BytesMut::from(&full[..8]);
        assert!(LlrpCodec::new().decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&full[..12]);
        assert!(LlrpCodec::new().decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut buf = encode(Message::new(1, MessageType::KEEPALIVE, Bytes::new()));
        buf.extend_from_slice(&encode(Message::new(2, MessageType::RO_ACCESS_REPORT, vec![9])));

        let mut codec = LlrpCodec::new();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(first.kind, MessageType::KEEPALIVE);
        assert_eq!(second.kind, MessageType::RO_ACCESS_REPORT);
        assert_eq!(&second.payload[..], &[9]);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_length_shorter_than_header() {
        let mut buf = BytesMut::from(&[0x04, 0x3F, 0, 0, 0, 4, 0, 0, 0, 1][..]);
        assert!(matches!(LlrpCodec::new().decode(&mut buf), Err(Error::Decode(_))));
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut buf = encode(Message::new(1, MessageType::RO_ACCESS_REPORT, vec![0; 64]));
        let err = LlrpCodec::with_max_frame_len(32).decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { length: 74, limit: 32 }));
    }

    #[test]
    fn request_types_pair_with_responses() {
        assert_eq!(
            MessageType::GET_READER_CAPABILITIES.response_type(),
            Some(MessageType::GET_READER_CAPABILITIES_RESPONSE)
        );
        assert_eq!(
            MessageType::CLOSE_CONNECTION.response_type(),
            Some(MessageType::CLOSE_CONNECTION_RESPONSE)
        );
        assert_eq!(
            MessageType::DISABLE_ACCESSSPEC.response_type(),
            Some(MessageType::DISABLE_ACCESSSPEC_RESPONSE)
        );
        assert_eq!(MessageType::KEEPALIVE.response_type(), None);
    }

    #[test]
    fn unknown_types_display_numerically() {
        assert_eq!(MessageType::new(999).to_string(), "MessageType(999)");
        assert_eq!(MessageType::START_ROSPEC.to_string(), "START_ROSPEC");
    }
}
