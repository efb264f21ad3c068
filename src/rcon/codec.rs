//! RCON wire frame encoding and decoding.
//!
//! Frames are little-endian: `i32 size | i32 request_id | i32 type |
//! payload | 2 NUL bytes`, where `size` counts everything after itself
//! (payload length + 10). One complete frame per socket read is assumed;
//! there is no reassembly of fragmented or coalesced frames.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Request type for the authentication handshake
pub const AUTH_REQUEST: i32 = 3;
/// Request type for a console command
pub const EXEC_REQUEST: i32 = 2;
/// Response type acknowledging authentication
pub const AUTH_RESPONSE: i32 = 2;
/// Response type carrying a command result
pub const EXEC_RESPONSE: i32 = 0;

/// Fixed request id used for every authentication request
pub const AUTH_REQUEST_ID: i32 = 0x123;
/// Request id of the first command; later commands increment from here
pub const FIRST_EXEC_ID: i32 = 0x321;

/// size + request_id + type
const HEADER_LEN: usize = 12;
/// The two trailing NUL bytes
const TERMINATOR_LEN: usize = 2;
/// Shortest well-formed frame: empty payload
pub const MIN_FRAME_LEN: usize = HEADER_LEN + TERMINATOR_LEN;

/// Error decoding a received byte sequence
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer is too short to hold even an empty frame
    #[error("frame truncated: {len} bytes")]
    Truncated { len: usize },
}

/// One decoded protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The size field as sent by the peer (never validated against the
    /// actual buffer length)
    pub size: i32,
    /// Request id this frame correlates to
    pub id: i32,
    /// Request or response type
    pub kind: i32,
    /// UTF-8 text payload
    pub body: String,
}

/// Encode a request into its wire frame.
///
/// The returned buffer is exactly `body.len() + 14` bytes and its size
/// field is `body.len() + 10`.
pub fn encode(kind: i32, id: i32, body: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + HEADER_LEN + TERMINATOR_LEN);
    buf.put_i32_le(body.len() as i32 + 10);
    buf.put_i32_le(id);
    buf.put_i32_le(kind);
    buf.put_slice(body.as_bytes());
    buf.put_u16_le(0);
    buf.freeze()
}

/// Decode a received byte sequence into a [`Frame`].
///
/// The payload is taken from byte 12 up to the last byte exclusive, then
/// stripped of trailing NUL terminators so that `decode(encode(..))`
/// recovers the original payload exactly. Invalid UTF-8 is replaced
/// rather than rejected.
pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(FrameError::Truncated { len: raw.len() });
    }

    let mut header = &raw[..HEADER_LEN];
    let size = header.get_i32_le();
    let id = header.get_i32_le();
    let kind = header.get_i32_le();

    let payload = &raw[HEADER_LEN..raw.len() - 1];
    let payload = match payload.iter().rposition(|&b| b != 0) {
        Some(last) => &payload[..=last],
        None => &[],
    };

    Ok(Frame {
        size,
        id,
        kind,
        body: String::from_utf8_lossy(payload).into_owned(),
    })
}
