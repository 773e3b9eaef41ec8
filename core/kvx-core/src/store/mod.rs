//! Store module: the key-value contract callers program against.
//!
//! [`Store`] is the only interface higher layers rely on. [`KvStore`]
//! implements it over any [`StoreEngine`], applying the value codec and
//! recording metrics; [`Table`] implements it by prefixing keys on top of
//! another store.
//!
//! # Contract
//!
//! - `put`: upsert; the value is encoded before it reaches the engine.
//! - `has`: `false` for absent keys, never a not-found error.
//! - `get`: decoded value, or [`KvxError::KeyNotFound`] when absent.
//! - `delete`: idempotent; deleting an absent key succeeds.
//! - `new_iterator`: snapshot cursor yielding RAW stored bytes.
//! - `new_batch`: empty write batch flushed atomically by `write`.
//! - `new_prefix_iterator`: snapshot cursor over keys under a prefix only.
//! - `close`: releases the engine handle; a no-op for tables.

pub mod batch;
pub mod iterator;
pub mod table;

pub use batch::{Batch, KvBatch};
pub use iterator::{Cursor, KvIterator};
pub use table::{Table, TableBatch, TableIterator, new_table_batch};

use crate::codec::ValueCodec;
use crate::config::StoreConfig;
use crate::engine::{MemoryEngine, SledEngine, StoreEngine};
use crate::error::{KvxError, KvxResult};
use crate::metrics::{Meter, MetricsSink, NoopMetrics, Timer, TimerGuard};
use crate::reclaim::{self, ReclaimPolicy, ReclaimScheduler, ReclaimStats};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Core key-value interface shared by stores and tables.
pub trait Store: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> KvxResult<()>;

    fn has(&self, key: &[u8]) -> KvxResult<bool>;

    fn get(&self, key: &[u8]) -> KvxResult<Vec<u8>>;

    fn delete(&self, key: &[u8]) -> KvxResult<()>;

    fn new_batch(&self) -> Box<dyn Batch + '_>;

    fn new_iterator(&self) -> KvxResult<Box<dyn KvIterator + '_>>;

    /// Like `new_iterator`, but the snapshot only holds keys starting with
    /// `prefix`.
    fn new_prefix_iterator(&self, prefix: &[u8]) -> KvxResult<Box<dyn KvIterator + '_>>;

    fn close(&self);
}

/// Instrument handles wired by [`KvStore::meter`]. `None` means unmetered.
#[derive(Default)]
pub(crate) struct StoreMeters {
    pub(crate) get_timer: Option<Arc<dyn Timer>>,
    pub(crate) put_timer: Option<Arc<dyn Timer>>,
    pub(crate) del_timer: Option<Arc<dyn Timer>>,
    pub(crate) miss_meter: Option<Arc<dyn Meter>>,
    pub(crate) read_meter: Option<Arc<dyn Meter>>,
    pub(crate) write_meter: Option<Arc<dyn Meter>>,
    pub(crate) batch_put_timer: Option<Arc<dyn Timer>>,
    pub(crate) batch_write_timer: Option<Arc<dyn Timer>>,
    pub(crate) batch_write_meter: Option<Arc<dyn Meter>>,
}

impl StoreMeters {
    fn register(sink: &dyn MetricsSink, prefix: &str) -> Self {
        let timer = |name: &str| Some(sink.new_timer(&format!("{prefix}{name}")));
        let meter = |name: &str| Some(sink.new_meter(&format!("{prefix}{name}")));
        Self {
            get_timer: timer("user/gets"),
            put_timer: timer("user/puts"),
            del_timer: timer("user/dels"),
            miss_meter: meter("user/misses"),
            read_meter: meter("user/reads"),
            write_meter: meter("user/writes"),
            batch_put_timer: timer("user/batchPuts"),
            batch_write_timer: timer("user/batchWriteTimes"),
            batch_write_meter: meter("user/batchWrites"),
        }
    }
}

pub(crate) fn mark(meter: &Option<Arc<dyn Meter>>, count: usize) {
    if let Some(meter) = meter {
        meter.mark(count as u64);
    }
}

/// Compressed, instrumented key-value store over an embedded engine.
///
/// # Examples
///
/// ```rust
/// use kvx_core::{KvStore, Store};
///
/// # fn main() -> kvx_core::KvxResult<()> {
/// let store = KvStore::open_in_memory()?;
/// store.put(b"k1", b"v1")?;
/// assert_eq!(store.get(b"k1")?, b"v1");
/// assert!(store.has(b"k1")?);
/// store.delete(b"k1")?;
/// assert!(!store.has(b"k1")?);
/// # Ok(())
/// # }
/// ```
pub struct KvStore<E: StoreEngine = SledEngine> {
    path: PathBuf,
    /// `None` once closed.
    engine: RwLock<Option<Arc<E>>>,
    codec: Arc<dyn ValueCodec>,
    sink: Arc<dyn MetricsSink>,
    meters: RwLock<Arc<StoreMeters>>,
    reclaim_policy: ReclaimPolicy,
    reclaimer: Mutex<Option<ReclaimScheduler>>,
    close_timeout: Duration,
}

impl KvStore<SledEngine> {
    /// Open (or create) a sled-backed store described by `config`.
    pub fn open(config: StoreConfig) -> KvxResult<Self> {
        Self::open_with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Like [`KvStore::open`], reporting into `sink` once [`meter`](Self::meter) is called.
    #[instrument(skip(config, sink), fields(path = %config.path.display()))]
    pub fn open_with_metrics(config: StoreConfig, sink: Arc<dyn MetricsSink>) -> KvxResult<Self> {
        config.validate()?;
        let engine = SledEngine::open(&config)?;
        let store = Self::with_engine(engine, &config, sink)?;
        info!("Database opened");
        Ok(store)
    }

    /// Open a temporary sled store (for testing). Data is deleted on drop.
    pub fn open_temporary() -> KvxResult<Self> {
        let config = StoreConfig::new(PathBuf::new()).with_reclaim(false);
        Self::with_engine(SledEngine::open_temporary()?, &config, Arc::new(NoopMetrics))
    }
}

impl KvStore<MemoryEngine> {
    /// In-memory store with default codec and no background reclaim.
    pub fn open_in_memory() -> KvxResult<Self> {
        let config = StoreConfig::new(PathBuf::new()).with_reclaim(false);
        Self::with_engine(MemoryEngine::new(), &config, Arc::new(NoopMetrics))
    }
}

impl<E: StoreEngine> KvStore<E> {
    /// Wrap an already opened engine.
    ///
    /// `config` supplies the codec, reclaim policy and close timeout; its
    /// engine settings are ignored.
    pub fn with_engine(
        engine: E,
        config: &StoreConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> KvxResult<Self> {
        config.validate()?;
        let engine = Arc::new(engine);
        let reclaim_policy = ReclaimPolicy::from(config);
        let reclaimer = if config.reclaim_enabled {
            Some(ReclaimScheduler::start(&engine, reclaim_policy)?)
        } else {
            None
        };

        Ok(Self {
            path: config.path.clone(),
            engine: RwLock::new(Some(engine)),
            codec: config.compression.codec(),
            sink,
            meters: RwLock::new(Arc::new(StoreMeters::default())),
            reclaim_policy,
            reclaimer: Mutex::new(reclaimer),
            close_timeout: config.close_timeout,
        })
    }

    /// Replace the value codec. Values already stored keep their old
    /// encoding, so this only makes sense on an empty store.
    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Directory the store was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle to the engine, or [`KvxError::Closed`] after `close`.
    pub fn engine(&self) -> KvxResult<Arc<E>> {
        self.engine.read().clone().ok_or(KvxError::Closed)
    }

    pub fn codec(&self) -> &dyn ValueCodec {
        self.codec.as_ref()
    }

    /// Wire timers and meters named `{prefix}user/...` into the metrics sink.
    ///
    /// No-op when the sink is disabled. Calling it again replaces the
    /// previous handles.
    pub fn meter(&self, prefix: &str) {
        if !self.sink.enabled() {
            return;
        }
        *self.meters.write() = Arc::new(StoreMeters::register(self.sink.as_ref(), prefix));
    }

    pub(crate) fn meters(&self) -> Arc<StoreMeters> {
        self.meters.read().clone()
    }

    fn read_decoded(&self, key: &[u8]) -> KvxResult<Vec<u8>> {
        let stored = self
            .engine()?
            .view(|txn| txn.get(key))?
            .ok_or(KvxError::KeyNotFound)?;
        self.codec.decode(&stored)
    }

    /// Snapshot cursor with access to the decoding variant of `value`.
    pub fn new_cursor(&self) -> KvxResult<Cursor<E>> {
        Ok(Cursor::new(self.engine()?.cursor()?, Arc::clone(&self.codec)))
    }

    /// [`new_cursor`](Self::new_cursor) restricted to keys under `prefix`.
    pub fn new_prefix_cursor(&self, prefix: &[u8]) -> KvxResult<Cursor<E>> {
        let inner = self.engine()?.prefix_cursor(prefix)?;
        Ok(Cursor::new(inner, Arc::clone(&self.codec)))
    }

    /// Run one reclaim cycle now and return its outcome.
    pub fn collect_garbage(&self) -> KvxResult<()> {
        let engine = self.engine()?;
        reclaim::collect_garbage(engine.as_ref(), self.reclaim_policy.discard_ratio)
    }

    /// Counters of the background reclaim thread, if one is running.
    pub fn reclaim_stats(&self) -> Option<ReclaimStats> {
        self.reclaimer.lock().as_ref().map(ReclaimScheduler::stats)
    }

    pub fn is_closed(&self) -> bool {
        self.engine.read().is_none()
    }
}

impl<E: StoreEngine> Store for KvStore<E> {
    fn put(&self, key: &[u8], value: &[u8]) -> KvxResult<()> {
        let engine = self.engine()?;
        let meters = self.meters();
        let _timer = TimerGuard::start(meters.put_timer.as_deref());
        mark(&meters.write_meter, value.len());

        engine.update(|txn| {
            let encoded = self.codec.encode(value)?;
            txn.set(key, encoded)
        })
    }

    fn has(&self, key: &[u8]) -> KvxResult<bool> {
        match self.engine()?.view(|txn| txn.contains(key)) {
            Err(e) if e.is_not_found() => Ok(false),
            other => other,
        }
    }

    fn get(&self, key: &[u8]) -> KvxResult<Vec<u8>> {
        let meters = self.meters();
        let _timer = TimerGuard::start(meters.get_timer.as_deref());

        let result = self.read_decoded(key);
        match &result {
            Ok(value) => mark(&meters.read_meter, value.len()),
            Err(_) => mark(&meters.miss_meter, 1),
        }
        result
    }

    fn delete(&self, key: &[u8]) -> KvxResult<()> {
        let engine = self.engine()?;
        let meters = self.meters();
        let _timer = TimerGuard::start(meters.del_timer.as_deref());

        match engine.update(|txn| txn.delete(key)) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(KvBatch::new(self))
    }

    fn new_iterator(&self) -> KvxResult<Box<dyn KvIterator + '_>> {
        Ok(Box::new(self.new_cursor()?))
    }

    fn new_prefix_iterator(&self, prefix: &[u8]) -> KvxResult<Box<dyn KvIterator + '_>> {
        Ok(Box::new(self.new_prefix_cursor(prefix)?))
    }

    /// Detach the engine, stop the reclaim thread, wait for it to quiesce,
    /// then close and drop the engine handle. Errors are logged; later calls
    /// are no-ops.
    ///
    /// Calls already in flight keep their own handle until they return; the
    /// engine is released when the last of them finishes.
    fn close(&self) {
        let Some(engine) = self.engine.write().take() else {
            return;
        };
        let reclaimer = self.reclaimer.lock().take();
        if let Some(reclaimer) = reclaimer {
            reclaimer.shutdown(self.close_timeout);
        }
        let result = engine.close();
        drop(engine);
        match result {
            Ok(()) => info!(path = %self.path.display(), "Database closed"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to close database"),
        }
    }
}

impl<E: StoreEngine> Drop for KvStore<E> {
    fn drop(&mut self) {
        self.close();
    }
}
