//! SQLite Checkpoint Store
//!
//! Persists the `(topic_name, ts, status)` row in a SQLite database via a
//! SQLx pool. The schema is created on construction if it does not exist,
//! so operators never run migrations by hand for a single-row table.
//!
//! `save` is an atomic upsert (`REPLACE INTO`) keyed by topic name and is
//! durable once it returns; `load` distinguishes "no checkpoint yet" from
//! database failure.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::{Error, Result};
use crate::{Checkpoint, Status};

const CHECKPOINT_TABLE: &str = "siphon_checkpoint";

/// SQLite-backed [`Checkpoint`].
pub struct SqliteCheckpoint {
    pool: SqlitePool,
    topic: String,
}

impl SqliteCheckpoint {
    /// Build a checkpoint for `topic` on an existing pool, creating the
    /// schema if needed.
    pub async fn new(pool: SqlitePool, topic: impl Into<String>) -> Result<Self> {
        let checkpoint = Self {
            pool,
            topic: topic.into(),
        };
        checkpoint.create_schema_if_needed().await?;
        Ok(checkpoint)
    }

    /// Open (or create) a checkpoint database file.
    pub async fn open(path: impl AsRef<Path>, topic: impl Into<String>) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::new(pool, topic).await
    }

    /// In-memory checkpoint for tests. A single connection keeps the shared
    /// in-memory database alive for the pool's lifetime.
    pub async fn in_memory(topic: impl Into<String>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new(pool, topic).await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn create_schema_if_needed(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {CHECKPOINT_TABLE}(
                topic_name VARCHAR(255) PRIMARY KEY,
                ts BIGINT NOT NULL,
                status INT NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Checkpoint for SqliteCheckpoint {
    async fn save(&self, ts: i64, status: Status) -> Result<()> {
        sqlx::query(&format!(
            "REPLACE INTO {CHECKPOINT_TABLE}(topic_name, ts, status) VALUES(?, ?, ?)"
        ))
        .bind(&self.topic)
        .bind(ts)
        .bind(status.as_i32())
        .execute(&self.pool)
        .await?;
        debug!(topic = %self.topic, ts, status = ?status, "checkpoint saved");
        Ok(())
    }

    async fn load(&self) -> Result<(i64, Status)> {
        let row: Option<(i64, i32)> = sqlx::query_as(&format!(
            "SELECT ts, status FROM {CHECKPOINT_TABLE} WHERE topic_name = ?"
        ))
        .bind(&self.topic)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((ts, status)) => Ok((ts, Status::from_i32(status)?)),
            None => Err(Error::NotFound(self.topic.clone())),
        }
    }
}
