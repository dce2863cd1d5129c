//! Pump Storage: Writer Loop & Output Channel
//!
//! `PumpStorage` is the public face of the storage engine. Producers call
//! [`PumpStorage::submit`] concurrently; a single writer task owns the
//! value log and turns the submissions into batched, fsync'd appends. The
//! downstream consumer drains the bounded output channel.
//!
//! ## Write Flow
//!
//! ```text
//! submit(record)                (any task)
//!     ↓  mpsc + oneshot
//! writer task:
//!     drain queue into a batch
//!     ↓ (under write lock)
//! vlog.write(batch)             ← one write_all + fsync
//!     ↓
//! index by record ts            ← unconsumed-record index
//!     ↓
//! ack each submitter            ← pointer, after durability
//!     ↓
//! try_send on output            ← never blocks
//! ```
//!
//! The writer never waits on the consumer. When the output channel is full
//! it arms the [slow chaser](crate::chaser) with the pointer of the first
//! record that did not fit and stops fast-path sends; the records stay
//! durable in the value log and the chaser re-feeds them by scanning. Once
//! the chaser has caught up under the write lock, fast-path delivery
//! resumes.
//!
//! ## Failure Policy
//!
//! A failed append leaves the segment truncated back to its pre-write
//! length, so the writer retries the batch once. A second failure fails
//! every submission in the batch and halts ingestion; durability promises
//! are never faked.

use std::sync::Arc;

use siphon_core::{Record, ValuePointer};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::chaser::SlowChaser;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::index::MemIndex;
use crate::vlog::{Request, ValueLog, VlogOptions};

struct WriteRequest {
    record: Record,
    reply: oneshot::Sender<Result<ValuePointer>>,
}

/// The pump storage engine: value log + writer loop + slow chaser.
pub struct PumpStorage {
    vlog: Arc<ValueLog>,
    index: Arc<MemIndex>,
    chaser: Arc<SlowChaser>,
    submissions: mpsc::Sender<WriteRequest>,
    output: Mutex<Option<mpsc::Receiver<Request>>>,
    shutdown: watch::Sender<bool>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    chaser_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PumpStorage {
    /// Open the storage in `config.dir` (created if missing) and spawn the
    /// writer and chaser tasks.
    pub async fn open(config: StorageConfig) -> Result<PumpStorage> {
        tokio::fs::create_dir_all(&config.dir).await?;

        let vlog = Arc::new(
            ValueLog::open(
                &config.dir,
                VlogOptions::default().with_file_size(config.value_log_file_size),
            )
            .await?,
        );
        let index = Arc::new(MemIndex::new());
        let write_lock = Arc::new(Mutex::new(()));

        let (submit_tx, submit_rx) = mpsc::channel(config.submission_queue_size);
        let (output_tx, output_rx) = mpsc::channel(config.message_buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let chaser = Arc::new(SlowChaser::new(
            vlog.clone(),
            config.chaser.clone(),
            output_tx.clone(),
            write_lock.clone(),
        ));

        let chaser_handle = tokio::spawn({
            let chaser = chaser.clone();
            let shutdown = shutdown_rx.clone();
            async move { chaser.run(shutdown).await }
        });

        let writer = WriterLoop {
            vlog: vlog.clone(),
            index: index.clone(),
            chaser: chaser.clone(),
            submissions: submit_rx,
            output: output_tx,
            write_lock,
            max_batch_size: config.max_batch_size.max(1),
            shutdown: shutdown_rx,
        };
        let writer_handle = tokio::spawn(writer.run());

        Ok(PumpStorage {
            vlog,
            index,
            chaser,
            submissions: submit_tx,
            output: Mutex::new(Some(output_rx)),
            shutdown: shutdown_tx,
            writer_handle: Mutex::new(Some(writer_handle)),
            chaser_handle: Mutex::new(Some(chaser_handle)),
        })
    }

    /// Submit one record. Resolves with the record's stable pointer once the
    /// record is durably on disk.
    pub async fn submit(&self, record: Record) -> Result<ValuePointer> {
        let (reply, response) = oneshot::channel();
        self.submissions
            .send(WriteRequest { record, reply })
            .await
            .map_err(|_| Error::Closed)?;
        response.await.map_err(|_| Error::Closed)?
    }

    /// Hand the output channel to the downstream consumer. Yields `None`
    /// after the first call: there is exactly one consumer.
    pub async fn take_output(&self) -> Option<mpsc::Receiver<Request>> {
        self.output.lock().await.take()
    }

    /// The downstream has durably consumed everything up to `ts`; drop those
    /// index entries. Returns how many were removed.
    pub async fn advance(&self, ts: i64) -> usize {
        self.index.advance(ts).await
    }

    /// Number of written-but-unconsumed records currently indexed.
    pub async fn pending(&self) -> usize {
        self.index.len().await
    }

    /// Look up the pointer indexed for `ts`.
    pub async fn pointer_for(&self, ts: i64) -> Option<ValuePointer> {
        self.index.get(ts).await
    }

    /// Read back a record payload by pointer.
    pub async fn read_value(&self, vp: ValuePointer) -> Result<bytes::Bytes> {
        self.vlog.read_value(vp).await
    }

    /// Drop whole value log segments whose records all have ts ≤ `safe_ts`.
    pub async fn gc(&self, safe_ts: i64) -> Result<usize> {
        self.vlog.gc_ts(safe_ts).await
    }

    /// Whether the slow chaser currently owns delivery.
    pub fn is_chasing(&self) -> bool {
        self.chaser.is_on()
    }

    /// Direct access to the value log (scans, reads).
    pub fn vlog(&self) -> &Arc<ValueLog> {
        &self.vlog
    }

    /// Stop both tasks, flush the value log, and wait for them to exit.
    pub async fn close(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.writer_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.chaser_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.vlog.close().await?;
        info!("pump storage closed");
        Ok(())
    }
}

struct WriterLoop {
    vlog: Arc<ValueLog>,
    index: Arc<MemIndex>,
    chaser: Arc<SlowChaser>,
    submissions: mpsc::Receiver<WriteRequest>,
    output: mpsc::Sender<Request>,
    write_lock: Arc<Mutex<()>>,
    max_batch_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl WriterLoop {
    async fn run(mut self) {
        info!("writer loop started");
        loop {
            let first = tokio::select! {
                req = self.submissions.recv() => match req {
                    Some(req) => req,
                    None => break,
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        self.drain_remaining().await;
                        break;
                    }
                    continue;
                }
            };

            let mut batch = vec![first];
            while batch.len() < self.max_batch_size {
                match self.submissions.try_recv() {
                    Ok(req) => batch.push(req),
                    Err(_) => break,
                }
            }

            if self.write_batch(batch).await.is_err() {
                break;
            }
        }
        info!("writer loop stopped");
    }

    /// Write out whatever is still queued at shutdown so acknowledged
    /// submitters are not left hanging.
    async fn drain_remaining(&mut self) {
        loop {
            let mut batch = Vec::new();
            while batch.len() < self.max_batch_size {
                match self.submissions.try_recv() {
                    Ok(req) => batch.push(req),
                    Err(_) => break,
                }
            }
            if batch.is_empty() {
                return;
            }
            if self.write_batch(batch).await.is_err() {
                return;
            }
        }
    }

    /// Returns `Err(())` when ingestion must halt.
    async fn write_batch(&mut self, batch: Vec<WriteRequest>) -> std::result::Result<(), ()> {
        let mut requests = Vec::with_capacity(batch.len());
        let mut replies = Vec::with_capacity(batch.len());
        for submission in batch {
            requests.push(Request::new(submission.record));
            replies.push(submission.reply);
        }

        let write_guard = self.write_lock.lock().await;

        let mut result = self.vlog.write(&mut requests).await;
        if let Err(err) = &result {
            // The failed append truncated the segment back to a clean
            // boundary; a single retry covers transient conditions such as
            // freed disk space.
            warn!(error = %err, "vlog write failed, retrying once");
            result = self.vlog.write(&mut requests).await;
        }

        if let Err(err) = result {
            error!(error = %err, "vlog write failed twice, halting ingestion");
            let message = err.to_string();
            for reply in replies {
                let _ = reply.send(Err(Error::WriteFailed(message.clone())));
            }
            return Err(());
        }

        for (req, reply) in requests.iter().zip(replies) {
            self.index.insert(req.record.ts(), req.value_pointer).await;
            let _ = reply.send(Ok(req.value_pointer));
        }

        // Fast path: non-blocking sends, never waiting on the consumer.
        // Once the chaser is armed it owns delivery until it turns off.
        if !self.chaser.is_on() {
            for req in requests {
                let pointer = req.value_pointer;
                match self.output.try_send(req) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            pointer = ?pointer,
                            "output channel full, arming slow chaser"
                        );
                        self.chaser.turn_on(pointer);
                        break;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        // The consumer hung up; records stay durable and
                        // scannable, so this is not a write failure.
                        break;
                    }
                }
            }
        }

        drop(write_guard);
        Ok(())
    }
}
