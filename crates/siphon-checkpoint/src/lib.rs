//! siphon Checkpoint
//!
//! The minimal durable record the replicator needs to resume: a single
//! `(topic, ts, status)` row with atomic upsert semantics.
//!
//! ## Status Semantics
//!
//! - [`Status::Normal`]: the service quit cleanly; every record with
//!   `commit_ts ≤ ts` is durably forwarded downstream.
//! - [`Status::Running`]: the service is running or quit abnormally; on
//!   restart the replicator must re-process from `ts` (at-least-once).
//!
//! The checkpoint ts is monotonically non-decreasing per topic: callers
//! only ever save a ts at or above the last one they loaded.
//!
//! The [`Checkpoint`] capability is a variant point for upper layers; the
//! SQLite-backed [`SqliteCheckpoint`] is the implementation shipped here.

pub mod error;
mod sql;

use async_trait::async_trait;

pub use error::{Error, Result};
pub use sql::SqliteCheckpoint;

/// Persisted replication progress, one of the two flags above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Clean shutdown: everything at or below the saved ts is downstream.
    Normal,
    /// Running or crashed: re-process from the saved ts on restart.
    Running,
}

impl Status {
    pub fn as_i32(self) -> i32 {
        match self {
            Status::Normal => 0,
            Status::Running => 1,
        }
    }

    pub fn from_i32(v: i32) -> Result<Self> {
        match v {
            0 => Ok(Status::Normal),
            1 => Ok(Status::Running),
            other => Err(Error::InvalidStatus(other)),
        }
    }
}

/// Save/load capability for replication progress.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    /// Atomically upsert the checkpoint row. Durable before returning.
    async fn save(&self, ts: i64, status: Status) -> Result<()>;

    /// The most recent durable save, or [`Error::NotFound`] when no save
    /// has ever succeeded for this topic.
    async fn load(&self) -> Result<(i64, Status)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(Status::from_i32(Status::Normal.as_i32()).unwrap(), Status::Normal);
        assert_eq!(
            Status::from_i32(Status::Running.as_i32()).unwrap(),
            Status::Running
        );
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!(matches!(Status::from_i32(7), Err(Error::InvalidStatus(7))));
    }
}
