//! Storage Metrics
//!
//! Prometheus metrics for the value log and the slow chaser. The library
//! only defines and updates them; exporting (pushgateway, scrape endpoint)
//! is the embedder's concern via [`register`].

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    /// Slow chaser state machine events, by kind:
    /// `turned_on`, `turned_off`, `catch_up`, `recovery`.
    pub static ref SLOW_CHASER_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "siphon_slow_chaser_events_total",
            "Slow chaser state machine events"
        ),
        &["event"]
    )
    .expect("metric can be created");

    /// Wall time of one slow chaser catch-up pass.
    pub static ref SLOW_CHASER_CATCH_UP_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "siphon_slow_chaser_catch_up_seconds",
            "Time taken by one slow chaser catch-up pass"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    )
    .expect("metric can be created");

    /// Records appended to the value log.
    pub static ref VLOG_WRITTEN_RECORDS: IntCounter = IntCounter::new(
        "siphon_vlog_written_records_total",
        "Records appended to the value log"
    )
    .expect("metric can be created");

    /// Bytes appended to the value log (frames included).
    pub static ref VLOG_WRITTEN_BYTES: IntCounter = IntCounter::new(
        "siphon_vlog_written_bytes_total",
        "Bytes appended to the value log"
    )
    .expect("metric can be created");

    /// Segments removed by timestamp GC.
    pub static ref VLOG_GC_DELETED_SEGMENTS: IntCounter = IntCounter::new(
        "siphon_vlog_gc_deleted_segments_total",
        "Value log segments removed by GC"
    )
    .expect("metric can be created");
}

/// Register every storage metric with `registry`.
pub fn register(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(SLOW_CHASER_EVENTS.clone()))?;
    registry.register(Box::new(SLOW_CHASER_CATCH_UP_SECONDS.clone()))?;
    registry.register(Box::new(VLOG_WRITTEN_RECORDS.clone()))?;
    registry.register(Box::new(VLOG_WRITTEN_BYTES.clone()))?;
    registry.register(Box::new(VLOG_GC_DELETED_SEGMENTS.clone()))?;
    Ok(())
}
