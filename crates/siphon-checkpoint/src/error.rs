//! Checkpoint Error Types
//!
//! `NotFound` is deliberately distinct from `Database`: a missing
//! checkpoint is an expected state on first start, and callers seed a new
//! one from their configured initial commit ts, whereas a database failure
//! must not be mistaken for "start from scratch".

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no checkpoint for topic: {0}")]
    NotFound(String),

    #[error("invalid checkpoint status: {0}")]
    InvalidStatus(i32),
}
