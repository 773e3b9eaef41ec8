//! Store configuration.
//!
//! Everything the engine needs at open time plus the reclaim and shutdown
//! knobs. Config loading is left to the embedding application; `StoreConfig`
//! is serde-friendly so it can live inside a larger config file.

use crate::codec::CompressionConfig;
use crate::error::{KvxError, KvxResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default interval between reclaim cycles.
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default discard ratio for value-log GC: reclaim a segment once half of
/// its bytes are stale.
pub const DEFAULT_DISCARD_RATIO: f64 = 0.5;

/// Default upper bound on how long `close` waits for the reclaim thread.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(15);

/// How the engine trades memory for speed when loading its tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Favour throughput; keeps more in memory (sled `HighThroughput`).
    #[default]
    MemoryMap,
    /// Favour a small footprint (sled `LowSpace`).
    LowSpace,
}

impl From<LoadMode> for sled::Mode {
    fn from(mode: LoadMode) -> Self {
        match mode {
            LoadMode::MemoryMap => sled::Mode::HighThroughput,
            LoadMode::LowSpace => sled::Mode::LowSpace,
        }
    }
}

/// Configuration for a [`KvStore`](crate::store::KvStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory.
    pub path: PathBuf,
    /// Flush to disk after every write transaction.
    pub sync_writes: bool,
    /// Background flush interval used when `sync_writes` is off.
    pub flush_every_ms: u64,
    /// Engine log segment size in bytes (power of two). `None` keeps the
    /// engine default.
    pub segment_size: Option<usize>,
    /// Table loading strategy.
    pub load_mode: LoadMode,
    /// Engine page cache size in bytes.
    pub cache_capacity: u64,
    /// Value codec.
    pub compression: CompressionConfig,
    /// Run the background reclaim loop.
    pub reclaim_enabled: bool,
    pub reclaim_interval: Duration,
    pub discard_ratio: f64,
    /// Upper bound on waiting for the reclaim thread during `close`.
    pub close_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kvx_data"),
            sync_writes: false,
            flush_every_ms: 500,
            segment_size: None,
            load_mode: LoadMode::MemoryMap,
            cache_capacity: 1024 * 1024 * 1024,
            compression: CompressionConfig::default(),
            reclaim_enabled: true,
            reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
            discard_ratio: DEFAULT_DISCARD_RATIO,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Default config rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_flush_every_ms(mut self, ms: u64) -> Self {
        self.flush_every_ms = ms;
        self
    }

    pub fn with_segment_size(mut self, bytes: usize) -> Self {
        self.segment_size = Some(bytes);
        self
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_reclaim(mut self, enabled: bool) -> Self {
        self.reclaim_enabled = enabled;
        self
    }

    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    pub fn with_discard_ratio(mut self, ratio: f64) -> Self {
        self.discard_ratio = ratio;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Reject settings the engine or scheduler cannot honour.
    pub fn validate(&self) -> KvxResult<()> {
        if !(self.discard_ratio > 0.0 && self.discard_ratio < 1.0) {
            return Err(KvxError::Config(format!(
                "discard_ratio must be in (0, 1), got {}",
                self.discard_ratio
            )));
        }
        if self.reclaim_enabled && self.reclaim_interval.is_zero() {
            return Err(KvxError::Config(
                "reclaim_interval must be non-zero".to_string(),
            ));
        }
        if let Some(size) = self.segment_size
            && !size.is_power_of_two()
        {
            return Err(KvxError::Config(format!(
                "segment_size must be a power of two, got {}",
                size
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> KvxResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> KvxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
