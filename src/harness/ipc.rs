//! Framing and messages for the helper channel
//!
//! Every frame is
//!
//! ```text
//! magic: u32 BE (0x504C5547, "PLUG") | length: u32 BE | type: u8 | payload
//! ```
//!
//! where `length` counts the type byte plus the JSON payload. HTTP bodies
//! inside payloads are base64 encoded.

use std::collections::BTreeMap;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

use super::buffer::ByteRing;

/// Frame marker, "PLUG" in ASCII.
pub const FRAME_MAGIC: u32 = 0x504C_5547;

/// Magic plus length.
pub const FRAME_HEADER_LEN: usize = 8;

/// Message types for the helper protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    // Host → Helper
    HttpRequest = 1,
    Shutdown = 2,

    // Helper → Host
    RegisterUri = 10,
    HttpResponse = 11,
    Message = 12,
}

impl TryFrom<u8> for MessageType {
    type Error = HostError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::HttpRequest),
            2 => Ok(MessageType::Shutdown),
            10 => Ok(MessageType::RegisterUri),
            11 => Ok(MessageType::HttpResponse),
            12 => Ok(MessageType::Message),
            _ => Err(HostError::Ipc(format!("Unknown message type: {}", value))),
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// A frame whose payload is `{}`.
    pub fn empty(msg_type: MessageType) -> Self {
        Self::new(msg_type, b"{}".to_vec())
    }

    pub fn json<T: Serialize>(msg_type: MessageType, data: &T) -> Result<Self> {
        Ok(Self::new(msg_type, serde_json::to_vec(data)?))
    }

    /// Parse payload as JSON
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let len = (1 + self.payload.len()) as u32;
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + 1 + self.payload.len());
        out.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.push(self.msg_type as u8);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + 1 + self.payload.len()
    }
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied, or `None` when
/// `buf` holds only part of a frame. A frame whose encoded size exceeds
/// `max_frame` can never fit the channel and is rejected from its header.
pub fn decode_frame(buf: &[u8], max_frame: usize) -> Result<Option<(Frame, usize)>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != FRAME_MAGIC {
        return Err(HostError::Ipc(format!("Bad frame magic: {:#010x}", magic)));
    }

    let len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if len == 0 {
        return Err(HostError::Ipc("Empty frame".to_string()));
    }
    let total = FRAME_HEADER_LEN + len;
    if total > max_frame {
        return Err(HostError::Ipc(format!(
            "Frame of {} bytes exceeds channel capacity of {}",
            total, max_frame
        )));
    }

    if buf.len() < total {
        return Ok(None);
    }

    let msg_type = MessageType::try_from(buf[FRAME_HEADER_LEN])?;
    let payload = buf[FRAME_HEADER_LEN + 1..total].to_vec();
    Ok(Some((Frame::new(msg_type, payload), total)))
}

/// Decode and remove one complete frame from the front of `ring`.
pub fn pop_frame(ring: &mut ByteRing) -> Result<Option<Frame>> {
    let max = ring.capacity();
    match decode_frame(ring.contents(), max)? {
        Some((frame, used)) => {
            ring.consume(used);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

/// Request forwarded to the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestMessage {
    pub id: u64,
    pub method: String,
    pub uri: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 body.
    #[serde(default)]
    pub body: String,
}

/// URI the helper wants routed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUriMessage {
    pub method: String,
    pub uri: String,
}

/// Helper's answer to an [`HttpRequestMessage`] with the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseMessage {
    pub id: u64,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 body.
    #[serde(default)]
    pub body: String,
}

/// Log line from the helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: String,
    pub text: String,
}

pub fn encode_body(body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(body)
}

pub fn decode_body(body: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| HostError::Ipc(format!("Invalid base64 body: {}", e)))
}
