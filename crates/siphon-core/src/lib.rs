//! siphon Core Types
//!
//! This crate defines the shared data model of the siphon change-data-capture
//! pump: the [`Record`] change event, the [`ValuePointer`] record address, and
//! the on-disk [`frame`] codec used by both the value log and the relay tier.
//!
//! Higher layers build on these types:
//!
//! ```text
//! ┌──────────────────┐
//! │ upstream source  │
//! └────────┬─────────┘
//!          │ Record
//!          ▼
//! ┌──────────────────┐      ┌──────────────────┐
//! │ siphon-storage   │ ───► │ downstream       │
//! │ (vlog + chaser)  │      │ consumer         │
//! └──────────────────┘      └────────┬─────────┘
//!                                    │ translated bytes
//!                                    ▼
//!                           ┌──────────────────┐
//!                           │ siphon-relay     │
//!                           └──────────────────┘
//! ```
//!
//! The payload of a record is opaque to every crate in this workspace: the
//! core moves change events, it never interprets them.

pub mod error;
pub mod frame;
pub mod pointer;
pub mod record;

pub use error::{Error, Result};
pub use pointer::{ValuePointer, POINTER_SIZE};
pub use record::{Record, RecordType, RECORD_META_SIZE};
