//! On-Disk Frame Codec
//!
//! Every record stored by the value log and the relay file tier is wrapped
//! in the same fixed frame:
//!
//! ```text
//! ┌───────────┬───────────────┬───────────┬──────────┐
//! │ Magic     │ Body Length   │ CRC32     │ Body     │
//! │ (4 bytes) │ (4 bytes)     │ (4 bytes) │ (N bytes)│
//! └───────────┴───────────────┴───────────┴──────────┘
//! ```
//!
//! Header integers are little-endian; the CRC32 covers the body bytes only.
//! Decoding verifies the magic and the checksum, so a torn or corrupted
//! frame is always detected before its body is interpreted.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::record::Record;

/// Magic bytes at the start of every frame.
pub const FRAME_MAGIC: u32 = u32::from_le_bytes(*b"SPHN");

/// Fixed header length: magic + body length + CRC32.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub body_len: u32,
    pub crc: u32,
}

/// Append one frame wrapping `body` to `buf`. Returns the encoded length.
pub fn encode_frame(buf: &mut BytesMut, body: &[u8]) -> usize {
    buf.reserve(FRAME_HEADER_SIZE + body.len());
    buf.put_u32_le(FRAME_MAGIC);
    buf.put_u32_le(body.len() as u32);
    buf.put_u32_le(crc32fast::hash(body));
    buf.put_slice(body);
    FRAME_HEADER_SIZE + body.len()
}

/// Append one frame wrapping the encoded `record` body to `buf`.
/// Returns the encoded length (header + body).
pub fn encode_record_frame(buf: &mut BytesMut, record: &Record) -> usize {
    let mut body = BytesMut::with_capacity(record.encoded_body_len());
    record.encode_body(&mut body);
    encode_frame(buf, &body)
}

/// Parse and validate a frame header.
pub fn decode_header(header: &[u8; FRAME_HEADER_SIZE]) -> Result<FrameHeader> {
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != FRAME_MAGIC {
        return Err(Error::InvalidMagic);
    }
    let body_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    Ok(FrameHeader { body_len, crc })
}

/// Verify the body against the checksum recorded in the header.
pub fn verify_body(header: &FrameHeader, body: &[u8]) -> Result<()> {
    let computed = crc32fast::hash(body);
    if computed != header.crc {
        return Err(Error::CrcMismatch {
            stored: header.crc,
            computed,
        });
    }
    Ok(())
}
