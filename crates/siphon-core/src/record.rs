//! Record Data Structure
//!
//! This module defines the core `Record` type - one atomic change event
//! flowing through the pump.
//!
//! ## What is a Record?
//!
//! A record is a single transactional change event from the upstream
//! database, one of:
//! - **Prewrite**: first phase of a 2PC transaction (`commit_ts` still 0)
//! - **Commit**: the commit marker for an earlier prewrite
//! - **Rollback**: the abort marker for an earlier prewrite
//! - **Ddl**: a schema change
//!
//! ## Structure
//!
//! Each record contains:
//! - **start_ts**: logical timestamp assigned when the transaction started
//! - **commit_ts**: logical timestamp assigned at commit (0 until committed)
//! - **tp**: the record type
//! - **payload**: the opaque change data (the core never interprets it)
//!
//! ## Design Decisions
//!
//! - Uses `bytes::Bytes` for zero-copy payload handling
//! - The payload is opaque: schema/DML semantics belong to the downstream
//! - `ts()` picks the timestamp used for indexing and garbage collection:
//!   `commit_ts` once known, otherwise `start_ts`

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed-size prefix of an encoded record body: start_ts + commit_ts + tp.
pub const RECORD_META_SIZE: usize = 8 + 8 + 1;

/// The kind of change event a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordType {
    Prewrite = 0,
    Commit = 1,
    Rollback = 2,
    Ddl = 3,
}

impl RecordType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(RecordType::Prewrite),
            1 => Ok(RecordType::Commit),
            2 => Ok(RecordType::Rollback),
            3 => Ok(RecordType::Ddl),
            other => Err(Error::InvalidRecordType(other)),
        }
    }
}

/// A single change event in the pump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Timestamp assigned when the transaction started
    pub start_ts: i64,

    /// Timestamp assigned at commit; 0 for a not-yet-committed prewrite
    pub commit_ts: i64,

    /// Record type
    pub tp: RecordType,

    /// Opaque change payload
    pub payload: Bytes,
}

impl Record {
    pub fn new(start_ts: i64, commit_ts: i64, tp: RecordType, payload: Bytes) -> Self {
        Self {
            start_ts,
            commit_ts,
            tp,
            payload,
        }
    }

    /// The timestamp this record is indexed and garbage-collected by:
    /// `commit_ts` once the transaction committed, `start_ts` before that.
    pub fn ts(&self) -> i64 {
        if self.commit_ts != 0 {
            self.commit_ts
        } else {
            self.start_ts
        }
    }

    /// Length of the encoded record body.
    pub fn encoded_body_len(&self) -> usize {
        RECORD_META_SIZE + self.payload.len()
    }

    /// Append the record body (`start_ts | commit_ts | tp | payload`) to `buf`.
    pub fn encode_body(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_body_len());
        buf.put_i64(self.start_ts);
        buf.put_i64(self.commit_ts);
        buf.put_u8(self.tp as u8);
        buf.put_slice(&self.payload);
    }

    /// Decode a record body produced by [`encode_body`](Self::encode_body).
    ///
    /// The remainder of `body` after the fixed meta prefix becomes the
    /// payload without copying.
    pub fn decode_body(mut body: Bytes) -> Result<Self> {
        if body.len() < RECORD_META_SIZE {
            return Err(Error::Truncated {
                needed: RECORD_META_SIZE,
                available: body.len(),
            });
        }
        let start_ts = body.get_i64();
        let commit_ts = body.get_i64();
        let tp = RecordType::from_u8(body.get_u8())?;
        Ok(Self {
            start_ts,
            commit_ts,
            tp,
            payload: body,
        })
    }
}
