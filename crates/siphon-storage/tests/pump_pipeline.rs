//! Pump Pipeline Tests
//!
//! Exercises the full storage engine: concurrent producers, the writer
//! loop, fast-path and chaser delivery, index advancement, and GC.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use siphon_core::{Record, RecordType};
use siphon_storage::{ChaserConfig, PumpStorage, StorageConfig};
use tempfile::TempDir;

fn commit_record(i: i64) -> Record {
    Record::new(i, i + 1, RecordType::Commit, Bytes::from(format!("change-{i}")))
}

#[tokio::test]
async fn concurrent_producers_deliver_every_record() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(
        PumpStorage::open(StorageConfig::new(dir.path()))
            .await
            .unwrap(),
    );
    let mut output = storage.take_output().await.unwrap();

    let producers = 4;
    let per_producer = 50;
    let mut handles = Vec::new();
    for p in 0..producers {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_producer {
                let ts = (p * per_producer + i) as i64;
                storage.submit(commit_record(ts)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = producers * per_producer;
    let mut seen = Vec::with_capacity(total);
    for _ in 0..total {
        let req = tokio::time::timeout(Duration::from_secs(5), output.recv())
            .await
            .expect("record delivered")
            .expect("channel open");
        seen.push(req.record.start_ts);
    }

    // Producers interleave nondeterministically; every submitted record
    // must come out exactly once.
    seen.sort_unstable();
    assert_eq!(seen, (0..total as i64).collect::<Vec<_>>());

    storage.close().await.unwrap();
}

#[tokio::test]
async fn consume_advance_then_gc() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path()).with_value_log_file_size(512);
    let storage = PumpStorage::open(config).await.unwrap();
    let mut output = storage.take_output().await.unwrap();

    let mut pointers = Vec::new();
    for i in 0..100 {
        pointers.push(storage.submit(commit_record(i)).await.unwrap());
    }
    assert_eq!(storage.pending().await, 100);

    // Drain and acknowledge the first half.
    let mut acked = 0i64;
    for _ in 0..50 {
        let req = tokio::time::timeout(Duration::from_secs(5), output.recv())
            .await
            .expect("record delivered")
            .expect("channel open");
        acked = req.record.commit_ts;
    }
    let removed = storage.advance(acked).await;
    assert_eq!(removed, 50);
    assert_eq!(storage.pending().await, 50);

    // Everything at or below the acknowledged ts is collectable.
    let deleted = storage.gc(acked).await.unwrap();
    assert!(deleted > 0);
    assert!(storage.read_value(pointers[0]).await.is_err());
    storage.read_value(pointers[99]).await.unwrap();

    storage.close().await.unwrap();
}

#[tokio::test]
async fn stalling_consumer_triggers_chaser_and_recovers() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path())
        .with_message_buffer_size(8)
        .with_chaser(
            ChaserConfig::default()
                .with_check_interval(Duration::from_millis(10))
                .with_recovery_cooldown(Duration::from_millis(50))
                .with_recovery_timeout(Duration::from_secs(5)),
        );
    let storage = PumpStorage::open(config).await.unwrap();
    let mut output = storage.take_output().await.unwrap();

    // Phase 1: fill far past the channel while the consumer stalls.
    let total = 300i64;
    for i in 0..total {
        storage.submit(commit_record(i)).await.unwrap();
    }
    assert!(storage.is_chasing());

    // Phase 2: the consumer wakes up and drains everything.
    let mut seen = Vec::new();
    while seen.len() < total as usize {
        let req = tokio::time::timeout(Duration::from_secs(10), output.recv())
            .await
            .expect("no record lost")
            .expect("channel open");
        seen.push(req.record.start_ts);
    }
    assert_eq!(seen, (0..total).collect::<Vec<_>>());

    // Phase 3: the chaser recovers; later submissions flow the fast path.
    tokio::time::timeout(Duration::from_secs(10), async {
        while storage.is_chasing() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("chaser recovered");

    for i in total..total + 5 {
        storage.submit(commit_record(i)).await.unwrap();
        let req = tokio::time::timeout(Duration::from_secs(5), output.recv())
            .await
            .expect("fast path delivery")
            .expect("channel open");
        assert_eq!(req.record.start_ts, i);
    }

    storage.close().await.unwrap();
}
