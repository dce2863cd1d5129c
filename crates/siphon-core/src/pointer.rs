//! Value Pointers
//!
//! A `ValuePointer` is the stable address of a record inside the value log:
//! the segment file suffix, the byte offset of the record's frame within
//! that segment, and the encoded frame length. It stays valid for as long
//! as the referenced segment file exists.
//!
//! Pointers order lexicographically by `(file_suffix, offset)`, which is
//! exactly append order across the whole log.
//!
//! The wire form is fixed-size big-endian:
//! `file_suffix: u64 | offset: i64 | length: u32` (20 bytes).

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serialized size of a value pointer.
pub const POINTER_SIZE: usize = 20;

/// Stable locator of one record in the value log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ValuePointer {
    /// Numeric suffix of the segment file
    pub file_suffix: u64,

    /// Byte offset of the record's frame within the segment
    pub offset: i64,

    /// Encoded frame length (header + body)
    pub length: u32,
}

impl ValuePointer {
    pub fn new(file_suffix: u64, offset: i64, length: u32) -> Self {
        Self {
            file_suffix,
            offset,
            length,
        }
    }

    /// Offset of the byte immediately after this record's frame.
    ///
    /// `(file_suffix, next_offset())` is a valid scan start position: either
    /// the next record in the same segment, or the segment's end if this was
    /// the last record.
    pub fn next_offset(&self) -> i64 {
        self.offset + self.length as i64
    }

    /// Serialize to the fixed 20-byte big-endian form.
    pub fn encode(&self) -> [u8; POINTER_SIZE] {
        let mut out = [0u8; POINTER_SIZE];
        {
            let mut buf = &mut out[..];
            buf.put_u64(self.file_suffix);
            buf.put_i64(self.offset);
            buf.put_u32(self.length);
        }
        out
    }

    /// Deserialize from the form produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != POINTER_SIZE {
            return Err(Error::InvalidPointer {
                expected: POINTER_SIZE,
                got: data.len(),
            });
        }
        let mut buf = data;
        Ok(Self {
            file_suffix: buf.get_u64(),
            offset: buf.get_i64(),
            length: buf.get_u32(),
        })
    }
}
