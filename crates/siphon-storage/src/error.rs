//! Storage Error Types
//!
//! Errors surfaced by the value log, the writer loop, and the slow chaser.
//!
//! The split matters to callers:
//!
//! - `Corrupt` mid-segment is fatal: the pump must not silently advance past
//!   a corrupted record. Tail corruption of the *newest* segment is the one
//!   recoverable case, repaired by truncation during `ValueLog::open`.
//! - `NotFound` means the addressed segment has been garbage-collected;
//!   scanners handle it by restarting from the oldest surviving segment.
//! - `Cancelled` terminates a task without error-logging noise.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record in {file} at offset {offset}: {source}")]
    Corrupt {
        file: String,
        offset: i64,
        #[source]
        source: siphon_core::Error,
    },

    #[error("segment {suffix} not found (garbage collected)")]
    NotFound { suffix: u64 },

    #[error("codec error: {0}")]
    Codec(#[from] siphon_core::Error),

    #[error("storage is shut down")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("recovery catch-up timed out after {0:?}")]
    RecoveryTimeout(Duration),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl Error {
    pub(crate) fn corrupt(file: &std::path::Path, offset: i64, source: siphon_core::Error) -> Self {
        Error::Corrupt {
            file: file.display().to_string(),
            offset,
            source,
        }
    }
}
