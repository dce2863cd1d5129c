//! Relay Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("relay directory {0} does not exist or is not a directory")]
    InvalidDir(String),

    #[error("translate failed: {0}")]
    Translate(String),
}
