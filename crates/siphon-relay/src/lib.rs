//! siphon Relay Tier
//!
//! A rotating append-only staging log kept by the downstream replicator.
//! Where the value log stores raw upstream records, the relay log stores
//! records *after* translation, so a crashed replicator can replay its
//! recent work without re-contacting the upstream.
//!
//! The relayer only appends and garbage-collects; reading the files back is
//! the replayer's concern (the frames are the shared
//! [`siphon_core::frame`] codec).

pub mod error;
pub mod files;
pub mod relayer;

pub use error::{Error, Result};
pub use files::{read_relay_names, relay_file_name, RELAY_FILE_EXT};
pub use relayer::{Position, Relayer, Translator};
