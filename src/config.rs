//! Index and sampling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on documents per partition, leaving headroom below the
/// engine's per-segment document limit.
pub const DEFAULT_MAX_PARTITION_SIZE: usize = i32::MAX as usize - 1000;

/// Default number of distinct values sampled per non-unique sampling step.
pub const DEFAULT_SAMPLE_SIZE_LIMIT: usize = 8_388_608;

/// Configuration of one logical schema index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Whether the index backs a uniqueness constraint.
    pub unique: bool,

    /// Maximum number of documents the writer places in one partition
    /// before another partition is added.
    pub max_partition_size: usize,

    /// Interval at which `drop` polls for outstanding tasks (in milliseconds).
    pub task_poll_interval_ms: u64,

    /// How long `drop` waits for outstanding tasks before giving up.
    /// `None` waits indefinitely.
    pub drop_timeout_ms: Option<u64>,
}

impl IndexConfig {
    /// Non-unique index with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a uniqueness-constrained index.
    pub fn unique() -> Self {
        Self {
            unique: true,
            ..Self::default()
        }
    }

    /// Set whether values are unique per index.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set the maximum number of document slots per partition.
    pub fn with_max_partition_size(mut self, max_partition_size: usize) -> Self {
        self.max_partition_size = max_partition_size;
        self
    }

    /// Set how often waiting for tasks re-checks their count.
    pub fn with_task_poll_interval(mut self, interval: Duration) -> Self {
        self.task_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set how long a drop waits for running tasks; `None` waits forever.
    pub fn with_drop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drop_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Poll interval as a [`Duration`].
    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms.max(1))
    }

    /// Drop timeout as a [`Duration`], if bounded.
    pub fn drop_timeout(&self) -> Option<Duration> {
        self.drop_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            unique: false,
            max_partition_size: DEFAULT_MAX_PARTITION_SIZE,
            task_poll_interval_ms: 10,
            drop_timeout_ms: None,
        }
    }
}

/// Configuration of index sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSamplingConfig {
    /// Maximum number of distinct values held in memory per sampling step.
    pub sample_size_limit: usize,
}

impl IndexSamplingConfig {
    /// Sampling with at most `sample_size_limit` distinct values per step.
    pub fn new(sample_size_limit: usize) -> Self {
        Self { sample_size_limit }
    }
}

impl Default for IndexSamplingConfig {
    fn default() -> Self {
        Self {
            sample_size_limit: DEFAULT_SAMPLE_SIZE_LIMIT,
        }
    }
}
