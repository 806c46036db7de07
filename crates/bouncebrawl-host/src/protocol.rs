//! Wire format of host broadcasts: a 1-byte frame type followed by a
//! MessagePack payload.

use serde::{Deserialize, Serialize};

use bouncebrawl_core::events::MatchEvent;
use bouncebrawl_core::session::SessionSnapshot;

/// Maximum frame size in bytes, type byte included.
pub const MAX_FRAME_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Event = 0x10,
    Snapshot = 0x11,
    Rejected = 0x12,
}

impl FrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x10 => Some(Self::Event),
            0x11 => Some(Self::Snapshot),
            0x12 => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A command the session refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedMsg {
    pub command: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchFrame {
    Event(MatchEvent),
    Snapshot(Box<SessionSnapshot>),
    Rejected(RejectedMsg),
}

#[derive(Debug)]
pub enum ProtocolError {
    EmptyFrame,
    UnknownFrameType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFrame => write!(f, "empty frame"),
            Self::UnknownFrameType(b) => write!(f, "unknown frame type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(f, "payload too large: {size} bytes (max {MAX_FRAME_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

fn encode_payload<T: Serialize>(frame_type: FrameType, payload: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_FRAME_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(frame_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

pub fn encode_frame(frame: &MatchFrame) -> Result<Vec<u8>, ProtocolError> {
    match frame {
        MatchFrame::Event(e) => encode_payload(FrameType::Event, e),
        MatchFrame::Snapshot(s) => encode_payload(FrameType::Snapshot, s),
        MatchFrame::Rejected(r) => encode_payload(FrameType::Rejected, r),
    }
}

pub fn decode_frame(data: &[u8]) -> Result<MatchFrame, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyFrame);
    };
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    match FrameType::from_byte(first).ok_or(ProtocolError::UnknownFrameType(first))? {
        FrameType::Event => Ok(MatchFrame::Event(decode_payload(data)?)),
        FrameType::Snapshot => Ok(MatchFrame::Snapshot(Box::new(decode_payload(data)?))),
        FrameType::Rejected => Ok(MatchFrame::Rejected(decode_payload(data)?)),
    }
}
