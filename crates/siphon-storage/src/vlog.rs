//! Segmented Value Log
//!
//! The value log is the durable heart of the pump: an append-only record
//! store split into rotating segment files, with O(1) append, O(1) random
//! read by pointer, forward scan from any pointer, and whole-segment
//! garbage collection by timestamp.
//!
//! ## On-Disk Layout
//!
//! A directory of files named by zero-padded numeric suffix:
//!
//! ```text
//! vlog/
//!   0000000000000000.log      (read-only)
//!   0000000000000001.log      (read-only)
//!   0000000000000002.log      (active, append-only)
//! ```
//!
//! Only the newest segment is ever written. Each file is a sequence of
//! frames (see [`siphon_core::frame`]); a [`ValuePointer`] addresses one
//! frame as `(file_suffix, offset, length)`.
//!
//! ## Write Path
//!
//! `write` serializes a whole batch into one buffer, appends it with a
//! single write call, fsyncs, and only then fills in each request's
//! pointer. A batch is never split across segments: rotation happens
//! *before* the next write once the active segment has reached its cap.
//! If an append fails partway (disk full), the segment is truncated back
//! to its pre-write length so it stays replayable, and the caller may
//! retry once space is available.
//!
//! ## Recovery
//!
//! `open` replays the newest segment from offset 0 and truncates it at
//! the first torn or corrupt frame. Corruption anywhere else is fatal and
//! surfaces as [`Error::Corrupt`].
//!
//! ## Concurrency
//!
//! One writer at a time (the pump's writer loop, serialized externally by
//! its write lock); any number of concurrent readers. `gc_ts` serializes
//! concurrent GC behind its own lock and never blocks reads or writes. A
//! scanner keeps each segment's file handle open while inside it, so GC
//! deleting the file under it is harmless; segment boundaries consult the
//! live segment map and skip suffixes that no longer exist.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use siphon_core::frame::{self, FRAME_HEADER_SIZE};
use siphon_core::{Record, ValuePointer};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::metrics;

/// Extension of value log segment files.
pub const LOG_FILE_EXT: &str = "log";

/// Value log tuning options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VlogOptions {
    /// Segment cap in bytes; the active segment rotates once it reaches this
    #[serde(default = "default_file_size")]
    pub file_size: u64,
}

impl Default for VlogOptions {
    fn default() -> Self {
        Self {
            file_size: default_file_size(),
        }
    }
}

impl VlogOptions {
    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size = bytes;
        self
    }
}

fn default_file_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

/// A record paired with its stable address, as carried on the output
/// channel and yielded by [`RequestScanner`].
#[derive(Debug, Clone)]
pub struct Request {
    pub record: Record,
    pub value_pointer: ValuePointer,
}

impl Request {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            value_pointer: ValuePointer::default(),
        }
    }
}

fn log_file_name(suffix: u64) -> String {
    format!("{:016}.{}", suffix, LOG_FILE_EXT)
}

fn parse_log_suffix(name: &str) -> Option<u64> {
    name.strip_suffix(".log")?.parse().ok()
}

/// fsync a directory so a created or removed file name is durable.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

/// One segment file. `max_ts` is the largest record ts appended to it,
/// `i64::MIN` when unknown (segment predates this process).
struct Segment {
    suffix: u64,
    path: PathBuf,
    max_ts: AtomicI64,
}

impl Segment {
    fn new(suffix: u64, path: PathBuf) -> Self {
        Self {
            suffix,
            path,
            max_ts: AtomicI64::new(i64::MIN),
        }
    }

    fn note_ts(&self, ts: i64) {
        self.max_ts.fetch_max(ts, Ordering::AcqRel);
    }

    fn max_ts(&self) -> Option<i64> {
        match self.max_ts.load(Ordering::Acquire) {
            i64::MIN => None,
            ts => Some(ts),
        }
    }
}

struct ActiveSegment {
    file: File,
    suffix: u64,
    offset: i64,
}

/// The segmented append-only value log.
pub struct ValueLog {
    dir: PathBuf,
    opts: VlogOptions,
    segments: RwLock<BTreeMap<u64, Arc<Segment>>>,
    active: Mutex<ActiveSegment>,
    gc_lock: Mutex<()>,
}

impl ValueLog {
    /// Open the value log in `dir`, creating segment 0 if the directory is
    /// empty, and repairing a torn tail on the newest segment.
    pub async fn open(dir: impl AsRef<Path>, opts: VlogOptions) -> Result<ValueLog> {
        let dir = dir.as_ref().to_path_buf();

        let mut suffixes = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(suffix) = parse_log_suffix(&entry.file_name().to_string_lossy()) {
                suffixes.push(suffix);
            }
        }
        suffixes.sort_unstable();

        let mut segments = BTreeMap::new();
        let newest = match suffixes.last().copied() {
            Some(newest) => {
                for suffix in suffixes {
                    let path = dir.join(log_file_name(suffix));
                    segments.insert(suffix, Arc::new(Segment::new(suffix, path)));
                }
                newest
            }
            None => {
                let path = dir.join(log_file_name(0));
                let file = OpenOptions::new()
                    .create_new(true)
                    .write(true)
                    .open(&path)
                    .await?;
                file.sync_all().await?;
                sync_dir(&dir)?;
                segments.insert(0, Arc::new(Segment::new(0, path)));
                0
            }
        };

        let newest_seg = segments.get(&newest).expect("newest segment present").clone();
        let (valid_len, max_ts) = replay_tail(&newest_seg.path).await?;
        if let Some(ts) = max_ts {
            newest_seg.note_ts(ts);
        }

        let file = OpenOptions::new().append(true).open(&newest_seg.path).await?;

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            active_suffix = newest,
            offset = valid_len,
            "value log opened"
        );

        Ok(ValueLog {
            dir,
            opts,
            segments: RwLock::new(segments),
            active: Mutex::new(ActiveSegment {
                file,
                suffix: newest,
                offset: valid_len as i64,
            }),
            gc_lock: Mutex::new(()),
        })
    }

    /// Append a batch of requests as one fsync'd write, filling in each
    /// request's `value_pointer` on success.
    ///
    /// The whole batch lands in the current segment; if the previous write
    /// filled the segment to its cap, rotation happens first. On an append
    /// failure the segment is truncated back to its pre-write length and
    /// the error is returned; the same batch may then be retried.
    pub async fn write(&self, batch: &mut [Request]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut active = self.active.lock().await;

        if active.offset >= self.opts.file_size as i64 {
            // Rotation failure keeps the current segment active; the next
            // write retries it.
            self.rotate(&mut active).await?;
        }

        let start_offset = active.offset;
        let mut buf = BytesMut::new();
        let mut batch_max_ts = i64::MIN;
        for req in batch.iter_mut() {
            let offset = start_offset + buf.len() as i64;
            let length = frame::encode_record_frame(&mut buf, &req.record);
            req.value_pointer = ValuePointer::new(active.suffix, offset, length as u32);
            batch_max_ts = batch_max_ts.max(req.record.ts());
        }

        if let Err(err) = append_all(&mut active.file, &buf).await {
            if let Err(trunc_err) = restore_len(&mut active.file, start_offset as u64).await {
                error!(
                    suffix = active.suffix,
                    error = %trunc_err,
                    "failed to truncate segment after failed write"
                );
            }
            return Err(err.into());
        }

        active.offset += buf.len() as i64;

        if let Some(seg) = self.segments.read().await.get(&active.suffix) {
            seg.note_ts(batch_max_ts);
        }

        metrics::VLOG_WRITTEN_RECORDS.inc_by(batch.len() as u64);
        metrics::VLOG_WRITTEN_BYTES.inc_by(buf.len() as u64);
        Ok(())
    }

    async fn rotate(&self, active: &mut ActiveSegment) -> Result<()> {
        let next = active.suffix + 1;
        let path = self.dir.join(log_file_name(next));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await?;
        file.sync_all().await?;
        sync_dir(&self.dir)?;

        self.segments
            .write()
            .await
            .insert(next, Arc::new(Segment::new(next, path)));

        info!(suffix = next, "rotated to new vlog segment");
        *active = ActiveSegment {
            file,
            suffix: next,
            offset: 0,
        };
        Ok(())
    }

    /// Read back the payload of the record at `vp`.
    pub async fn read_value(&self, vp: ValuePointer) -> Result<Bytes> {
        Ok(self.read_record(vp).await?.payload)
    }

    /// Read back the whole record at `vp`.
    pub async fn read_record(&self, vp: ValuePointer) -> Result<Record> {
        let seg = self
            .segments
            .read()
            .await
            .get(&vp.file_suffix)
            .cloned()
            .ok_or(Error::NotFound {
                suffix: vp.file_suffix,
            })?;

        let mut file = match File::open(&seg.path).await {
            Ok(file) => file,
            // Raced with GC between the map lookup and the open.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    suffix: vp.file_suffix,
                })
            }
            Err(err) => return Err(err.into()),
        };
        file.seek(SeekFrom::Start(vp.offset as u64)).await?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        file.read_exact(&mut header).await?;
        let hdr =
            frame::decode_header(&header).map_err(|e| Error::corrupt(&seg.path, vp.offset, e))?;

        let mut body = vec![0u8; hdr.body_len as usize];
        file.read_exact(&mut body).await?;
        frame::verify_body(&hdr, &body).map_err(|e| Error::corrupt(&seg.path, vp.offset, e))?;

        Record::decode_body(Bytes::from(body)).map_err(|e| Error::corrupt(&seg.path, vp.offset, e))
    }

    /// Scan records forward from `from` across segment boundaries, calling
    /// `visit` for each. The visitor may break out early or propagate an
    /// error. The scan ends cleanly at the newest segment's end.
    pub async fn scan<F>(&self, from: ValuePointer, mut visit: F) -> Result<()>
    where
        F: FnMut(ValuePointer, Record) -> Result<ControlFlow<()>>,
    {
        let mut scanner = self.scan_requests(from).await?;
        while let Some(req) = scanner.next().await? {
            match visit(req.value_pointer, req.record)? {
                ControlFlow::Break(()) => return Ok(()),
                ControlFlow::Continue(()) => {}
            }
        }
        Ok(())
    }

    /// Pull-based scan used by the slow chaser, which must await channel
    /// sends between records. Only `from.file_suffix` and `from.offset` are
    /// consulted. If the start segment has been garbage-collected, the scan
    /// begins at the oldest surviving segment with a larger suffix.
    pub async fn scan_requests(&self, from: ValuePointer) -> Result<RequestScanner<'_>> {
        Ok(RequestScanner {
            vlog: self,
            start: from,
            next_suffix: from.file_suffix,
            current: None,
            offset: 0,
            first: true,
        })
    }

    /// Delete whole segments whose records are all at or below `safe_ts`.
    ///
    /// Serialized against concurrent GC by an internal lock; never touches
    /// the newest (active) segment; does not block reads or writes. Returns
    /// the number of segments removed.
    pub async fn gc_ts(&self, safe_ts: i64) -> Result<usize> {
        let _guard = self.gc_lock.lock().await;

        let (candidates, newest) = {
            let segments = self.segments.read().await;
            let newest = *segments.keys().next_back().expect("at least one segment");
            (segments.values().cloned().collect::<Vec<_>>(), newest)
        };

        let mut deleted = 0usize;
        for seg in candidates {
            if seg.suffix >= newest {
                continue;
            }
            let max_ts = match seg.max_ts() {
                Some(ts) => ts,
                None => {
                    // Segment written by an earlier process run; derive the
                    // watermark by scanning it once.
                    let ts = self.segment_max_ts(&seg).await?;
                    seg.note_ts(ts);
                    ts
                }
            };
            if max_ts > safe_ts {
                continue;
            }

            self.segments.write().await.remove(&seg.suffix);
            tokio::fs::remove_file(&seg.path).await?;
            deleted += 1;
            metrics::VLOG_GC_DELETED_SEGMENTS.inc();
            info!(
                suffix = seg.suffix,
                max_ts, safe_ts, "garbage collected vlog segment"
            );
        }

        if deleted > 0 {
            sync_dir(&self.dir)?;
        }
        Ok(deleted)
    }

    async fn segment_max_ts(&self, seg: &Segment) -> Result<i64> {
        let mut file = File::open(&seg.path).await?;
        let mut offset = 0i64;
        let mut max_ts = i64::MIN;
        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            match file.read_exact(&mut header).await {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            let hdr = frame::decode_header(&header)
                .map_err(|e| Error::corrupt(&seg.path, offset, e))?;
            let mut body = vec![0u8; hdr.body_len as usize];
            file.read_exact(&mut body).await?;
            frame::verify_body(&hdr, &body).map_err(|e| Error::corrupt(&seg.path, offset, e))?;
            let record = Record::decode_body(Bytes::from(body))
                .map_err(|e| Error::corrupt(&seg.path, offset, e))?;
            max_ts = max_ts.max(record.ts());
            offset += (FRAME_HEADER_SIZE + hdr.body_len as usize) as i64;
        }
        Ok(max_ts)
    }

    /// Number of live segment files.
    pub async fn segment_count(&self) -> usize {
        self.segments.read().await.len()
    }

    /// Live segment suffixes in ascending order.
    pub async fn segment_suffixes(&self) -> Vec<u64> {
        self.segments.read().await.keys().copied().collect()
    }

    /// Current end of log: the active segment's suffix and append offset.
    pub async fn head_pointer(&self) -> ValuePointer {
        let active = self.active.lock().await;
        ValuePointer::new(active.suffix, active.offset, 0)
    }

    /// Flush the active segment.
    pub async fn close(&self) -> Result<()> {
        self.active.lock().await.file.sync_all().await?;
        Ok(())
    }
}

async fn append_all(file: &mut File, buf: &[u8]) -> std::io::Result<()> {
    file.write_all(buf).await?;
    file.sync_all().await?;
    Ok(())
}

async fn restore_len(file: &mut File, len: u64) -> std::io::Result<()> {
    file.set_len(len).await?;
    file.sync_all().await
}

/// Replay a segment from offset 0, returning the length of the valid prefix
/// and the max record ts seen. The file is truncated at the first torn or
/// invalid frame.
async fn replay_tail(path: &Path) -> Result<(u64, Option<i64>)> {
    let mut file = OpenOptions::new().read(true).write(true).open(path).await?;
    let file_len = file.metadata().await?.len();

    let mut valid_len = 0u64;
    let mut max_ts: Option<i64> = None;
    loop {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        match file.read_exact(&mut header).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let hdr = match frame::decode_header(&header) {
            Ok(hdr) => hdr,
            Err(_) => break,
        };
        let mut body = vec![0u8; hdr.body_len as usize];
        match file.read_exact(&mut body).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        if frame::verify_body(&hdr, &body).is_err() {
            break;
        }
        let record = match Record::decode_body(Bytes::from(body)) {
            Ok(record) => record,
            Err(_) => break,
        };
        max_ts = Some(max_ts.map_or(record.ts(), |ts| ts.max(record.ts())));
        valid_len += (FRAME_HEADER_SIZE + hdr.body_len as usize) as u64;
    }

    if valid_len < file_len {
        warn!(
            file = %path.display(),
            valid_len,
            file_len,
            "truncating corrupt tail of newest vlog segment"
        );
        file.set_len(valid_len).await?;
        file.sync_all().await?;
    }
    Ok((valid_len, max_ts))
}

struct OpenSegment {
    file: File,
    suffix: u64,
    path: PathBuf,
    newest: bool,
}

/// Forward scanner over the value log, yielding one [`Request`] at a time.
///
/// A torn frame at the tail of the newest segment is an in-flight append,
/// not corruption: the scan ends cleanly there and a later scan picks the
/// record up once it is fully written. Torn or invalid frames in any older
/// segment are fatal.
pub struct RequestScanner<'a> {
    vlog: &'a ValueLog,
    start: ValuePointer,
    next_suffix: u64,
    current: Option<OpenSegment>,
    offset: i64,
    first: bool,
}

impl RequestScanner<'_> {
    /// The next record in pointer order, or `None` at end of log.
    pub async fn next(&mut self) -> Result<Option<Request>> {
        loop {
            if self.current.is_none() && !self.open_next().await? {
                return Ok(None);
            }
            let cur = self.current.as_mut().expect("segment just opened");

            let mut header = [0u8; FRAME_HEADER_SIZE];
            match cur.file.read_exact(&mut header).await {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if cur.newest {
                        return Ok(None);
                    }
                    self.current = None;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            let hdr = match frame::decode_header(&header) {
                Ok(hdr) => hdr,
                Err(_) if cur.newest => return Ok(None),
                Err(e) => return Err(Error::corrupt(&cur.path, self.offset, e)),
            };

            let mut body = vec![0u8; hdr.body_len as usize];
            match cur.file.read_exact(&mut body).await {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if cur.newest {
                        return Ok(None);
                    }
                    return Err(Error::corrupt(
                        &cur.path,
                        self.offset,
                        siphon_core::Error::Truncated {
                            needed: hdr.body_len as usize,
                            available: 0,
                        },
                    ));
                }
                Err(err) => return Err(err.into()),
            }

            if let Err(e) = frame::verify_body(&hdr, &body) {
                if cur.newest {
                    return Ok(None);
                }
                return Err(Error::corrupt(&cur.path, self.offset, e));
            }

            let record = Record::decode_body(Bytes::from(body))
                .map_err(|e| Error::corrupt(&cur.path, self.offset, e))?;

            let length = (FRAME_HEADER_SIZE + hdr.body_len as usize) as u32;
            let value_pointer = ValuePointer::new(cur.suffix, self.offset, length);
            self.offset += length as i64;
            return Ok(Some(Request {
                record,
                value_pointer,
            }));
        }
    }

    async fn open_next(&mut self) -> Result<bool> {
        loop {
            let (seg, newest) = {
                let segments = self.vlog.segments.read().await;
                let Some((_, seg)) = segments.range(self.next_suffix..).next() else {
                    return Ok(false);
                };
                let newest = *segments.keys().next_back().expect("non-empty");
                (seg.clone(), newest)
            };

            let mut file = match File::open(&seg.path).await {
                Ok(file) => file,
                // Raced with GC; move on to the next surviving segment.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    self.next_suffix = seg.suffix + 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let mut offset = 0i64;
            if self.first && seg.suffix == self.start.file_suffix && self.start.offset > 0 {
                file.seek(SeekFrom::Start(self.start.offset as u64)).await?;
                offset = self.start.offset;
            }
            self.first = false;
            self.offset = offset;
            self.next_suffix = seg.suffix + 1;
            self.current = Some(OpenSegment {
                file,
                suffix: seg.suffix,
                path: seg.path.clone(),
                newest: seg.suffix == newest,
            });
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use siphon_core::RecordType;
    use tempfile::TempDir;

    fn rand_record() -> Record {
        let mut rng = rand::thread_rng();
        let mut payload = vec![0u8; rng.gen_range(1..64)];
        rng.fill(&mut payload[..]);
        Record::new(rng.gen(), 0, RecordType::Prewrite, Bytes::from(payload))
    }

    async fn new_vlog(dir: &TempDir, opts: VlogOptions) -> ValueLog {
        ValueLog::open(dir.path(), opts).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_empty_creates_first_segment() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;
        assert_eq!(vlog.segment_suffixes().await, vec![0]);
        assert!(dir.path().join("0000000000000000.log").exists());
    }

    #[tokio::test]
    async fn test_single_write_read() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;

        let mut batch = vec![Request::new(rand_record())];
        vlog.write(&mut batch).await.unwrap();

        let payload = vlog.read_value(batch[0].value_pointer).await.unwrap();
        assert_eq!(payload, batch[0].record.payload);
    }

    #[tokio::test]
    async fn test_batch_write_read_and_mid_scan() {
        for (req_num, opts) in [
            (1usize, VlogOptions::default()),
            (128, VlogOptions::default()),
            (1024, VlogOptions::default().with_file_size(3000)),
        ] {
            let dir = TempDir::new().unwrap();
            let vlog = new_vlog(&dir, opts).await;

            // Multiple write calls so small file caps produce several
            // segments (one batch is never split).
            let mut all = Vec::with_capacity(req_num);
            for chunk in (0..req_num).collect::<Vec<_>>().chunks(16) {
                let mut batch: Vec<Request> =
                    chunk.iter().map(|_| Request::new(rand_record())).collect();
                vlog.write(&mut batch).await.unwrap();
                all.extend(batch);
            }

            for req in &all {
                let payload = vlog.read_value(req.value_pointer).await.unwrap();
                assert_eq!(payload, req.record.payload);
            }

            // Scan starting at the middle request.
            let mid = all.len() / 2;
            let mut idx = mid;
            vlog.scan(all[mid].value_pointer, |vp, record| {
                assert_eq!(vp, all[idx].value_pointer);
                assert_eq!(record.payload, all[idx].record.payload);
                idx += 1;
                Ok(ControlFlow::Continue(()))
            })
            .await
            .unwrap();
            assert_eq!(idx, all.len());
        }
    }

    #[tokio::test]
    async fn test_multiple_segments_created_under_small_cap() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default().with_file_size(200)).await;

        for _ in 0..20 {
            let mut batch = vec![Request::new(rand_record())];
            vlog.write(&mut batch).await.unwrap();
        }
        assert!(vlog.segment_count().await > 1);
    }

    #[tokio::test]
    async fn test_exact_cap_rotates_before_next_write() {
        let dir = TempDir::new().unwrap();
        // One record of 21-byte payload encodes to exactly 50 bytes.
        let payload_len = 21;
        let encoded = FRAME_HEADER_SIZE + siphon_core::RECORD_META_SIZE + payload_len;
        let vlog = new_vlog(
            &dir,
            VlogOptions::default().with_file_size(encoded as u64),
        )
        .await;

        let mut batch = vec![Request::new(Record::new(
            1,
            0,
            RecordType::Prewrite,
            Bytes::from(vec![0u8; payload_len]),
        ))];
        vlog.write(&mut batch).await.unwrap();
        assert_eq!(batch[0].value_pointer.file_suffix, 0);
        assert_eq!(vlog.segment_count().await, 1);

        let mut batch = vec![Request::new(rand_record())];
        vlog.write(&mut batch).await.unwrap();
        assert_eq!(batch[0].value_pointer.file_suffix, 1);
        assert_eq!(batch[0].value_pointer.offset, 0);
    }

    #[tokio::test]
    async fn test_close_and_open() {
        let dir = TempDir::new().unwrap();
        let opts = VlogOptions::default().with_file_size(100);

        let mut all = Vec::new();
        for _ in 0..10 {
            let vlog = new_vlog(&dir, opts).await;
            let mut batch: Vec<Request> = (0..3).map(|_| Request::new(rand_record())).collect();
            vlog.write(&mut batch).await.unwrap();
            all.extend(batch);
            vlog.close().await.unwrap();
        }

        let vlog = new_vlog(&dir, opts).await;
        for req in &all {
            let payload = vlog.read_value(req.value_pointer).await.unwrap();
            assert_eq!(payload, req.record.payload);
        }
    }

    #[tokio::test]
    async fn test_reopen_truncates_corrupt_tail() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;

        let mut batch: Vec<Request> = (0..3).map(|_| Request::new(rand_record())).collect();
        vlog.write(&mut batch).await.unwrap();
        let good_len: i64 = batch
            .iter()
            .map(|r| r.value_pointer.length as i64)
            .sum();
        vlog.close().await.unwrap();
        drop(vlog);

        // Torn write: garbage bytes after the last valid frame.
        let path = dir.path().join("0000000000000000.log");
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01]);
        std::fs::write(&path, &raw).unwrap();

        let vlog = new_vlog(&dir, VlogOptions::default()).await;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len as u64);

        // All original records still readable, and appends continue cleanly.
        for req in &batch {
            assert_eq!(
                vlog.read_value(req.value_pointer).await.unwrap(),
                req.record.payload
            );
        }
        let mut more = vec![Request::new(rand_record())];
        vlog.write(&mut more).await.unwrap();
        assert_eq!(more[0].value_pointer.offset, good_len);
        assert_eq!(
            vlog.read_value(more[0].value_pointer).await.unwrap(),
            more[0].record.payload
        );
    }

    #[tokio::test]
    async fn test_reopen_truncates_partial_valid_frame() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;

        let mut batch: Vec<Request> = (0..2).map(|_| Request::new(rand_record())).collect();
        vlog.write(&mut batch).await.unwrap();
        vlog.close().await.unwrap();
        drop(vlog);

        // Cut the last frame in half: a realistic crash mid-append.
        let path = dir.path().join("0000000000000000.log");
        let full = std::fs::metadata(&path).unwrap().len();
        let cut = full - (batch[1].value_pointer.length as u64 / 2);
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(cut).unwrap();
        drop(file);

        let vlog = new_vlog(&dir, VlogOptions::default()).await;
        let good_len = batch[0].value_pointer.length as u64;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
        assert_eq!(
            vlog.read_value(batch[0].value_pointer).await.unwrap(),
            batch[0].record.payload
        );
    }

    #[tokio::test]
    async fn test_gc_ts_blocked_by_gc_lock() {
        let dir = TempDir::new().unwrap();
        let vlog = Arc::new(new_vlog(&dir, VlogOptions::default().with_file_size(2048)).await);

        // 100 records of 128-byte payloads across several segments.
        let payload = Bytes::from(vec![0u8; 128]);
        let mut pointers = Vec::with_capacity(100);
        for i in 0..100i64 {
            let mut batch = vec![Request::new(Record::new(
                i,
                0,
                RecordType::Prewrite,
                payload.clone(),
            ))];
            vlog.write(&mut batch).await.unwrap();
            pointers.push(batch[0].value_pointer);
        }

        let before = vlog.segment_count().await;
        assert!(before > 1, "expected multiple segments, got {before}");

        let guard = vlog.gc_lock.lock().await;
        let gc = tokio::spawn({
            let vlog = vlog.clone();
            async move { vlog.gc_ts(90).await.unwrap() }
        });

        // While the lock is held the concurrent GC must not delete anything.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(vlog.segment_count().await, before, "gc was not prevented");

        drop(guard);
        let deleted = gc.await.unwrap();
        assert!(deleted > 0, "no segment was deleted");
        assert!(vlog.segment_count().await < before);

        // ts 0 was collected; ts 91 must still be readable.
        assert!(vlog.read_value(pointers[0]).await.is_err());
        vlog.read_value(pointers[91]).await.unwrap();
    }

    #[tokio::test]
    async fn test_gc_never_deletes_newest_segment() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;

        let mut batch = vec![Request::new(Record::new(
            1,
            0,
            RecordType::Prewrite,
            Bytes::from("x"),
        ))];
        vlog.write(&mut batch).await.unwrap();

        assert_eq!(vlog.gc_ts(i64::MAX).await.unwrap(), 0);
        assert_eq!(vlog.segment_count().await, 1);
        vlog.read_value(batch[0].value_pointer).await.unwrap();
    }

    #[tokio::test]
    async fn test_gc_after_reopen_scans_for_watermark() {
        let dir = TempDir::new().unwrap();
        let opts = VlogOptions::default().with_file_size(200);
        {
            let vlog = new_vlog(&dir, opts).await;
            for i in 0..10i64 {
                let mut batch = vec![Request::new(Record::new(
                    i,
                    0,
                    RecordType::Prewrite,
                    Bytes::from(vec![0u8; 64]),
                ))];
                vlog.write(&mut batch).await.unwrap();
            }
            vlog.close().await.unwrap();
        }

        // A fresh process has no in-memory watermarks; GC derives them.
        let vlog = new_vlog(&dir, opts).await;
        let before = vlog.segment_count().await;
        assert!(before > 1);
        let deleted = vlog.gc_ts(4).await.unwrap();
        assert!(deleted > 0);
        assert!(vlog.segment_count().await < before);
    }

    #[tokio::test]
    async fn test_scan_restarts_past_gc_hole() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default().with_file_size(200)).await;

        let mut all = Vec::new();
        for i in 0..20i64 {
            let mut batch = vec![Request::new(Record::new(
                i,
                0,
                RecordType::Prewrite,
                Bytes::from(vec![i as u8; 64]),
            ))];
            vlog.write(&mut batch).await.unwrap();
            all.extend(batch);
        }

        let first_suffix = all[0].value_pointer.file_suffix;
        vlog.gc_ts(5).await.unwrap();
        let survivors = vlog.segment_suffixes().await;
        assert!(!survivors.contains(&first_suffix));

        // Scanning from the collected pointer resumes at the oldest
        // surviving segment.
        let mut seen = Vec::new();
        vlog.scan(all[0].value_pointer, |_, record| {
            seen.push(record.start_ts);
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap();
        assert!(!seen.is_empty());
        assert_eq!(*seen.last().unwrap(), 19);
        for pair in seen.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[tokio::test]
    async fn test_scan_stop_control_flow() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;

        let mut batch: Vec<Request> = (0..10).map(|_| Request::new(rand_record())).collect();
        vlog.write(&mut batch).await.unwrap();

        let mut visited = 0;
        vlog.scan(batch[0].value_pointer, |_, _| {
            visited += 1;
            if visited == 4 {
                Ok(ControlFlow::Break(()))
            } else {
                Ok(ControlFlow::Continue(()))
            }
        })
        .await
        .unwrap();
        assert_eq!(visited, 4);
    }

    #[tokio::test]
    async fn test_read_value_not_found_for_unknown_suffix() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default()).await;
        let err = vlog
            .read_value(ValuePointer::new(42, 0, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { suffix: 42 }));
    }

    #[tokio::test]
    async fn test_pointers_strictly_increasing() {
        let dir = TempDir::new().unwrap();
        let vlog = new_vlog(&dir, VlogOptions::default().with_file_size(300)).await;

        let mut pointers = Vec::new();
        for _ in 0..30 {
            let mut batch: Vec<Request> = (0..3).map(|_| Request::new(rand_record())).collect();
            vlog.write(&mut batch).await.unwrap();
            pointers.extend(batch.into_iter().map(|r| r.value_pointer));
        }
        for pair in pointers.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }
}
