//! siphon Storage Engine
//!
//! The pump storage engine at the center of the siphon CDC pipeline. It
//! ingests a totally-ordered stream of change records, buffers them durably
//! in a segmented append-only value log, and forwards them to a downstream
//! consumer with at-least-once delivery and monotonic timestamp progress.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  producers  │
//! └──────┬──────┘
//!        │ submit(record)
//!        ▼
//! ┌─────────────────┐   fsync'd batches   ┌─────────────────┐
//! │  writer loop    │ ──────────────────► │  value log      │
//! │  (single task)  │                     │  (segments)     │
//! └──────┬──────────┘                     └───────┬─────────┘
//!        │ try_send (never blocks)                │ scan
//!        ▼                                        ▼
//! ┌─────────────────┐     catch-up sends  ┌─────────────────┐
//! │ output channel  │ ◄────────────────── │  slow chaser    │
//! └──────┬──────────┘                     └─────────────────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │  consumer   │
//! └─────────────┘
//! ```
//!
//! Writes never wait on the consumer: durability comes from the value log,
//! and delivery catch-up from the slow chaser. See the module docs of
//! [`vlog`], [`writer`], and [`chaser`] for the details of each piece.

pub mod chaser;
pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod vlog;
pub mod writer;

pub use chaser::SlowChaser;
pub use config::{ChaserConfig, StorageConfig};
pub use error::{Error, Result};
pub use index::MemIndex;
pub use vlog::{Request, RequestScanner, ValueLog, VlogOptions};
pub use writer::PumpStorage;
