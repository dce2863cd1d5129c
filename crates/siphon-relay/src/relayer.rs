//! Relayer
//!
//! A rotating append-only file set used by the downstream replicator to
//! stage already-translated records for crash recovery. Unlike the value
//! log, the relayer stores the *output* of translation, so a replayer can
//! re-apply records without the upstream being available.
//!
//! ## Contract
//!
//! - `write_binlog` translates the record via the [`Translator`] seam,
//!   appends one frame, fsyncs, and returns a [`Position`] identifying the
//!   record boundary. Positions within a segment are strictly increasing.
//! - Rotation happens *after* the write that pushes the active segment past
//!   its size cap, so the returned position always refers to the segment
//!   that was written.
//! - `gc(pos)` removes every segment strictly before `pos.suffix`. The
//!   segment containing `pos` is retained: in-flight readers may still be
//!   inside it.
//! - After `close`, the active segment is still listed by
//!   [`read_relay_names`](crate::files::read_relay_names).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use siphon_core::{frame, Record};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::files::{parse_relay_suffix, relay_file_name};

/// Translates an upstream record into the downstream representation staged
/// in the relay log. Pure function; implemented by the replicator.
pub trait Translator: Send + Sync {
    fn translate(
        &self,
        schema: &str,
        table: &str,
        record: &Record,
        prewrite_value: &[u8],
    ) -> Result<Bytes>;
}

/// A record boundary in the relay file set: everything before it has been
/// durably staged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub suffix: u64,
    pub offset: i64,
}

struct ActiveFile {
    file: File,
    suffix: u64,
    offset: i64,
}

/// The rotating relay log.
pub struct Relayer {
    dir: PathBuf,
    segment_size: u64,
    translator: Arc<dyn Translator>,
    active: Mutex<ActiveFile>,
}

impl Relayer {
    /// Open the relay log in `dir`, resuming at the newest existing segment
    /// or creating segment 0. Fails if `dir` does not exist, is not a
    /// directory, or is not writable.
    pub async fn new(
        dir: impl AsRef<Path>,
        segment_size: u64,
        translator: Arc<dyn Translator>,
    ) -> Result<Relayer> {
        let dir = dir.as_ref().to_path_buf();
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(Error::InvalidDir(dir.display().to_string())),
        }

        let mut newest: Option<u64> = None;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(suffix) = parse_relay_suffix(&entry.file_name().to_string_lossy()) {
                newest = Some(newest.map_or(suffix, |n: u64| n.max(suffix)));
            }
        }

        let suffix = newest.unwrap_or(0);
        let path = dir.join(relay_file_name(suffix));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let offset = file.metadata().await?.len() as i64;
        sync_dir(&dir)?;

        info!(
            dir = %dir.display(),
            suffix,
            offset,
            "relayer opened"
        );
        Ok(Relayer {
            dir,
            segment_size,
            translator,
            active: Mutex::new(ActiveFile {
                file,
                suffix,
                offset,
            }),
        })
    }

    /// Translate and append one record. Returns the position after the
    /// appended frame.
    pub async fn write_binlog(
        &self,
        schema: &str,
        table: &str,
        record: &Record,
        prewrite_value: &[u8],
    ) -> Result<Position> {
        let payload = self
            .translator
            .translate(schema, table, record, prewrite_value)?;

        let mut buf = BytesMut::new();
        frame::encode_frame(&mut buf, &payload);

        let mut active = self.active.lock().await;
        active.file.write_all(&buf).await?;
        active.file.sync_all().await?;
        active.offset += buf.len() as i64;

        let pos = Position {
            suffix: active.suffix,
            offset: active.offset,
        };

        if active.offset >= self.segment_size as i64 {
            // Rotation failure is retried after the next write; the current
            // segment simply keeps growing until then.
            if let Err(err) = self.rotate(&mut active).await {
                warn!(error = %err, "relay rotation failed, keeping current segment");
            }
        }
        Ok(pos)
    }

    async fn rotate(&self, active: &mut ActiveFile) -> Result<()> {
        let next = active.suffix + 1;
        let path = self.dir.join(relay_file_name(next));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await?;
        file.sync_all().await?;
        sync_dir(&self.dir)?;
        info!(suffix = next, "rotated to new relay segment");
        *active = ActiveFile {
            file,
            suffix: next,
            offset: 0,
        };
        Ok(())
    }

    /// Remove every segment strictly before `pos.suffix`. The segment
    /// containing `pos` is retained for in-flight readers.
    pub async fn gc(&self, pos: Position) -> Result<usize> {
        let mut suffixes = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(suffix) = parse_relay_suffix(&entry.file_name().to_string_lossy()) {
                if suffix < pos.suffix {
                    suffixes.push(suffix);
                }
            }
        }

        let mut deleted = 0usize;
        for suffix in suffixes {
            let path = self.dir.join(relay_file_name(suffix));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    info!(suffix, "garbage collected relay segment");
                }
                // Leave it for the next GC pass.
                Err(err) => warn!(suffix, error = %err, "failed to remove relay segment"),
            }
        }
        if deleted > 0 {
            sync_dir(&self.dir)?;
        }
        Ok(deleted)
    }

    /// Flush and close the active segment.
    pub async fn close(&self) -> Result<()> {
        let active = self.active.lock().await;
        active.file.sync_all().await?;
        info!(suffix = active.suffix, "relayer closed");
        Ok(())
    }
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}
