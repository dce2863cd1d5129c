//! Slow Chaser
//!
//! When the downstream consumer falls behind, the writer loop stops pushing
//! records onto the output channel (it never blocks on the consumer) and
//! arms the slow chaser with the pointer of the first undelivered record.
//! From then on the chaser owns delivery: it scans the value log forward
//! from that pointer and blocking-sends every record to the output channel,
//! in append order.
//!
//! ## State Machine
//!
//! ```text
//!             TurnOn(ptr)                 recovery succeeds
//!   ┌─────┐ ──────────────► ┌────┐ ─────────────────────────► ┌─────┐
//!   │ Off │                 │ On │   (catch-up while writes   │ Off │
//!   └─────┘                 └────┘    are paused reaches       └─────┘
//!                             ▲       end of log)
//!                             └── catch-up loop, every pass
//! ```
//!
//! A catch-up pass that takes at least `slow_catch_up_threshold`, or a
//! recovery attempt within `recovery_cooldown` of the last one, defers
//! recovery: the consumer is evidently still slow. Otherwise the chaser
//! grabs the write lock (quiescing the writer), re-runs catch-up under
//! `recovery_timeout`, and — because nothing could be appended meanwhile —
//! reaching end of log proves it is fully caught up and it turns off. The
//! writer then resumes fast-path delivery.
//!
//! ## Ordering
//!
//! Records reach the output channel in value-log append order no matter
//! which path delivered them: the writer stops fast-path sends the moment
//! the chaser is armed, and only resumes after the chaser has delivered
//! everything up to end of log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use siphon_core::ValuePointer;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ChaserConfig;
use crate::error::{Error, Result};
use crate::metrics::{SLOW_CHASER_CATCH_UP_SECONDS, SLOW_CHASER_EVENTS};
use crate::vlog::{Request, ValueLog};

pub struct SlowChaser {
    on: AtomicBool,
    vlog: Arc<ValueLog>,
    /// Pointer of the first record not yet delivered downstream.
    /// `Some` exactly while the chaser is on. Never held across an await.
    last_unread: StdMutex<Option<ValuePointer>>,
    last_recover_attempt: StdMutex<Option<Instant>>,
    config: ChaserConfig,
    output: mpsc::Sender<Request>,
    write_lock: Arc<Mutex<()>>,
}

impl SlowChaser {
    pub fn new(
        vlog: Arc<ValueLog>,
        config: ChaserConfig,
        output: mpsc::Sender<Request>,
        write_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            on: AtomicBool::new(false),
            vlog,
            last_unread: StdMutex::new(None),
            last_recover_attempt: StdMutex::new(None),
            config,
            output,
            write_lock,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    /// Arm the chaser with the pointer of the first undelivered record.
    /// Called by the writer loop when the output channel is full.
    pub fn turn_on(&self, last_unread: ValuePointer) {
        *self.last_unread.lock().expect("chaser pointer lock") = Some(last_unread);
        self.on.store(true, Ordering::Release);
        info!(pointer = ?last_unread, "slow chaser turned on");
        SLOW_CHASER_EVENTS.with_label_values(&["turned_on"]).inc();
    }

    fn turn_off(&self) {
        self.on.store(false, Ordering::Release);
        *self.last_unread.lock().expect("chaser pointer lock") = None;
        info!("slow chaser turned off");
        SLOW_CHASER_EVENTS.with_label_values(&["turned_off"]).inc();
    }

    /// Drive the chaser until `shutdown` signals. Runs as its own task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("slow chaser started");
        loop {
            if !self.wait_until_turned_on(&mut shutdown).await {
                info!("slow chaser quits");
                return;
            }

            if self.last_unread.lock().expect("chaser pointer lock").is_none() {
                error!("last unread pointer missing while the slow chaser is on");
                continue;
            }

            let t0 = Instant::now();
            match self.catch_up(&mut shutdown).await {
                Ok(()) => {}
                Err(Error::Cancelled) | Err(Error::Closed) => {
                    info!("slow chaser quits");
                    return;
                }
                Err(err) => {
                    error!(error = %err, "slow chaser failed to catch up");
                    continue;
                }
            }
            let t_catch_up = t0.elapsed();
            SLOW_CHASER_CATCH_UP_SECONDS.observe(t_catch_up.as_secs_f64());

            let slow_catch_up = t_catch_up >= self.config.slow_catch_up_threshold;
            let recent_recover_attempt = self
                .last_recover_attempt
                .lock()
                .expect("chaser recover lock")
                .map_or(false, |at| at.elapsed() <= self.config.recovery_cooldown);

            if slow_catch_up || recent_recover_attempt {
                info!(
                    slow_catch_up,
                    recent_recover_attempt, "skipping slow chaser recovery for now"
                );
                continue;
            }

            *self
                .last_recover_attempt
                .lock()
                .expect("chaser recover lock") = Some(Instant::now());

            match self.try_recover(&mut shutdown).await {
                Ok(()) => info!("recovered from slow mode"),
                Err(Error::Cancelled) | Err(Error::Closed) => {
                    info!("slow chaser quits");
                    return;
                }
                Err(err @ Error::RecoveryTimeout(_)) => {
                    warn!(error = %err, "slow chaser recovery timed out, resuming writes");
                }
                Err(err) => {
                    error!(error = %err, "failed to recover from slow mode");
                }
            }
        }
    }

    /// Try to leave slow mode: pause writes, catch up within
    /// `recovery_timeout`, and turn off on success. Holding the write lock
    /// guarantees nothing is appended during this final catch-up, so
    /// reaching end of log means caught up. Exceeding the bound aborts the
    /// attempt with [`Error::RecoveryTimeout`] and releases the lock.
    async fn try_recover(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let write_guard = self.write_lock.lock().await;
        SLOW_CHASER_EVENTS.with_label_values(&["recovery"]).inc();
        info!("paused writes to recover from slow mode");

        let result = match tokio::time::timeout(
            self.config.recovery_timeout,
            self.catch_up(shutdown),
        )
        .await
        {
            Ok(Ok(())) => {
                self.turn_off();
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::RecoveryTimeout(self.config.recovery_timeout)),
        };
        drop(write_guard);
        result
    }

    /// Scan from `last_unread` to the current end of log, delivering every
    /// record to the output channel in order and advancing `last_unread`
    /// past each one.
    async fn catch_up(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        SLOW_CHASER_EVENTS.with_label_values(&["catch_up"]).inc();
        let Some(start) = *self.last_unread.lock().expect("chaser pointer lock") else {
            return Ok(());
        };
        debug!(start = ?start, "scanning vlog to catch up");

        let mut delivered = 0u64;
        let mut scanner = self.vlog.scan_requests(start).await?;
        loop {
            let Some(req) = scanner.next().await? else {
                break;
            };
            let next = ValuePointer::new(
                req.value_pointer.file_suffix,
                req.value_pointer.next_offset(),
                0,
            );
            tokio::select! {
                sent = self.output.send(req) => {
                    if sent.is_err() {
                        return Err(Error::Closed);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Err(Error::Cancelled);
                    }
                }
            }
            *self.last_unread.lock().expect("chaser pointer lock") = Some(next);
            delivered += 1;
        }

        debug!(delivered, "finished scanning vlog");
        Ok(())
    }

    /// Poll every `check_interval` until the chaser is turned on. Returns
    /// false when shutdown was signalled instead.
    async fn wait_until_turned_on(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        // Periodic polling is cheap next to scanning and less error prone
        // than a condition variable.
        let mut ticker = tokio::time::interval(self.config.check_interval);
        while !self.is_on() {
            if *shutdown.borrow() {
                return false;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
        !*shutdown.borrow()
    }
}
