//! Storage Configuration
//!
//! Tuning knobs for the pump storage engine. All of these are established at
//! startup and passed through constructors; nothing here is a mutable global.
//!
//! - **value_log_file_size**: segment cap before rotation (default: 1 GiB)
//! - **message_buffer_size**: output channel capacity; when the downstream
//!   consumer falls this far behind, the slow chaser takes over delivery
//! - **max_batch_size**: how many queued submissions the writer coalesces
//!   into one fsync'd append
//! - **chaser**: slow chaser timing (see [`ChaserConfig`])
//!
//! ## Usage
//!
//! ```ignore
//! use siphon_storage::StorageConfig;
//!
//! let config = StorageConfig::new("./data/vlog")
//!     .with_value_log_file_size(256 * 1024 * 1024)
//!     .with_message_buffer_size(8192);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the value log segments
    pub dir: PathBuf,

    /// Segment cap in bytes before rotation (default: 1 GiB)
    #[serde(default = "default_value_log_file_size")]
    pub value_log_file_size: u64,

    /// Output channel capacity (default: 4096)
    #[serde(default = "default_message_buffer_size")]
    pub message_buffer_size: usize,

    /// Maximum submissions coalesced into one append (default: 128)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Submission queue capacity (default: 8192)
    #[serde(default = "default_submission_queue_size")]
    pub submission_queue_size: usize,

    /// Slow chaser timing
    #[serde(default)]
    pub chaser: ChaserConfig,
}

impl StorageConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            value_log_file_size: default_value_log_file_size(),
            message_buffer_size: default_message_buffer_size(),
            max_batch_size: default_max_batch_size(),
            submission_queue_size: default_submission_queue_size(),
            chaser: ChaserConfig::default(),
        }
    }

    pub fn with_value_log_file_size(mut self, bytes: u64) -> Self {
        self.value_log_file_size = bytes;
        self
    }

    pub fn with_message_buffer_size(mut self, capacity: usize) -> Self {
        self.message_buffer_size = capacity;
        self
    }

    pub fn with_max_batch_size(mut self, records: usize) -> Self {
        self.max_batch_size = records;
        self
    }

    pub fn with_chaser(mut self, chaser: ChaserConfig) -> Self {
        self.chaser = chaser;
        self
    }
}

/// Slow chaser timing constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaserConfig {
    /// Bound on how long writes may be paused during recovery (default: 10 s)
    #[serde(default = "default_recovery_timeout", with = "duration_ms")]
    pub recovery_timeout: Duration,

    /// A catch-up pass at least this long means the consumer is still slow,
    /// so recovery is deferred (default: 1 s)
    #[serde(default = "default_slow_catch_up_threshold", with = "duration_ms")]
    pub slow_catch_up_threshold: Duration,

    /// Minimum gap between recovery attempts (default: 1 min)
    #[serde(default = "default_recovery_cooldown", with = "duration_ms")]
    pub recovery_cooldown: Duration,

    /// Polling interval while waiting to be turned on (default: 500 ms)
    #[serde(default = "default_check_interval", with = "duration_ms")]
    pub check_interval: Duration,
}

impl Default for ChaserConfig {
    fn default() -> Self {
        Self {
            recovery_timeout: default_recovery_timeout(),
            slow_catch_up_threshold: default_slow_catch_up_threshold(),
            recovery_cooldown: default_recovery_cooldown(),
            check_interval: default_check_interval(),
        }
    }
}

impl ChaserConfig {
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_slow_catch_up_threshold(mut self, threshold: Duration) -> Self {
        self.slow_catch_up_threshold = threshold;
        self
    }

    pub fn with_recovery_cooldown(mut self, cooldown: Duration) -> Self {
        self.recovery_cooldown = cooldown;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

fn default_value_log_file_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_message_buffer_size() -> usize {
    4096
}

fn default_max_batch_size() -> usize {
    128
}

fn default_submission_queue_size() -> usize {
    8192
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_slow_catch_up_threshold() -> Duration {
    Duration::from_secs(1)
}

fn default_recovery_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_check_interval() -> Duration {
    Duration::from_millis(500)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
