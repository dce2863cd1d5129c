//! Error Types for siphon-core
//!
//! Codec-level errors shared by the value log and relay file formats.
//!
//! ## Error Categories
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: frame doesn't start with the expected magic bytes
//! - `CrcMismatch`: payload corruption detected via checksum
//! - `Truncated`: frame header or body cut short (torn write)
//!
//! ### Decoding Errors
//! - `InvalidRecordType`: unknown record type tag on disk
//! - `InvalidPointer`: a serialized value pointer has the wrong length
//!
//! All functions in siphon-core return `Result<T>`, aliased to
//! `Result<T, Error>`, so callers can propagate with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid record type: {0}")]
    InvalidRecordType(u8),

    #[error("invalid value pointer: expected {expected} bytes, got {got}")]
    InvalidPointer { expected: usize, got: usize },
}
