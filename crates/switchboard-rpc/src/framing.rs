//! Binary response framing.
//!
//! Structured responses travel as JSON text frames. A command whose payload
//! is raw bytes instead uses this escape hatch: a single binary frame whose
//! first 4 bytes are the request id as an unsigned little-endian integer,
//! followed immediately by the payload.
//!
//! ```text
//! +----------------+------------------+
//! |  4 bytes       |  N bytes         |
//! |  (id, LE u32)  |  (raw payload)   |
//! +----------------+------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Id prefix size in bytes.
const ID_PREFIX_SIZE: usize = 4;

/// A unit of transport traffic.
///
/// Structured messages are [`Frame::Text`]; binary-framed command responses
/// are [`Frame::Binary`] and bypass JSON serialization entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// Build a binary response frame for `id` carrying `payload`.
#[must_use]
pub fn encode_binary_response(id: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(ID_PREFIX_SIZE + payload.len());
    buf.put_u32_le(id);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a binary response frame back into `(id, payload)`.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooShort`] if the frame does not contain a
/// full id prefix.
pub fn decode_binary_response(frame: &[u8]) -> Result<(u32, Bytes)> {
    if frame.len() < ID_PREFIX_SIZE {
        return Err(ProtocolError::FrameTooShort(frame.len()));
    }
    let mut buf = Bytes::copy_from_slice(frame);
    let id = buf.get_u32_le();
    Ok((id, buf))
}
