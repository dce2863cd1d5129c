//! Checkpoint Recovery Tests
//!
//! Crash-shaped scenarios against a file-backed database: save, drop every
//! handle, reopen, and verify the loaded state.

use siphon_checkpoint::{Checkpoint, Error, SqliteCheckpoint, Status};
use tempfile::TempDir;

#[tokio::test]
async fn save_survives_crash_and_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("checkpoint.db");

    {
        let checkpoint = SqliteCheckpoint::open(&db, "orders").await.unwrap();
        checkpoint.save(100, Status::Running).await.unwrap();
        // Crash: drop without any clean shutdown step.
    }

    let checkpoint = SqliteCheckpoint::open(&db, "orders").await.unwrap();
    assert_eq!(checkpoint.load().await.unwrap(), (100, Status::Running));

    checkpoint.save(200, Status::Normal).await.unwrap();
    assert_eq!(checkpoint.load().await.unwrap(), (200, Status::Normal));
}

#[tokio::test]
async fn monotonic_progress_across_reopens() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("checkpoint.db");

    let mut last = 0i64;
    for ts in [10i64, 50, 50, 300] {
        let checkpoint = SqliteCheckpoint::open(&db, "orders").await.unwrap();
        checkpoint.save(ts, Status::Running).await.unwrap();
        let (loaded, _) = checkpoint.load().await.unwrap();
        assert!(loaded >= last, "checkpoint regressed: {loaded} < {last}");
        last = loaded;
    }
}

#[tokio::test]
async fn missing_topic_is_not_found_even_with_other_rows() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("checkpoint.db");

    let other = SqliteCheckpoint::open(&db, "other-topic").await.unwrap();
    other.save(5, Status::Normal).await.unwrap();

    let checkpoint = SqliteCheckpoint::open(&db, "orders").await.unwrap();
    match checkpoint.load().await {
        Err(Error::NotFound(topic)) => assert_eq!(topic, "orders"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}
