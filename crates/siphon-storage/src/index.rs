//! In-Memory Record Index
//!
//! Maps record timestamp → [`ValuePointer`] for records that have been
//! written durably but not yet acknowledged by the downstream consumer.
//! Entries are dropped once the consumer advances past them; the index
//! therefore bounds the set of records the pump may still need to re-read.

use std::collections::BTreeMap;

use siphon_core::ValuePointer;
use tokio::sync::RwLock;

/// Timestamp-ordered index of unconsumed records.
#[derive(Default)]
pub struct MemIndex {
    entries: RwLock<BTreeMap<i64, ValuePointer>>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, ts: i64, vp: ValuePointer) {
        self.entries.write().await.insert(ts, vp);
    }

    pub async fn get(&self, ts: i64) -> Option<ValuePointer> {
        self.entries.read().await.get(&ts).copied()
    }

    /// Drop every entry with timestamp ≤ `ts`; returns how many were removed.
    pub async fn advance(&self, ts: i64) -> usize {
        let mut entries = self.entries.write().await;
        let keep = entries.split_off(&ts.saturating_add(1));
        let removed = entries.len();
        *entries = keep;
        removed
    }

    /// Oldest unconsumed timestamp, if any.
    pub async fn first_ts(&self) -> Option<i64> {
        self.entries.read().await.keys().next().copied()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
