// Engine fault injection: batch atomicity, read faults, reclaim failures

use kvx_core::engine::memory::MemoryCursor;
use kvx_core::engine::{ReadTxn, WriteTxn};
use kvx_core::error::{KvxError, KvxResult};
use kvx_core::{KvStore, MemoryEngine, MetricsRegistry, NoopMetrics, Store, StoreConfig, StoreEngine};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Switches shared between a test and its engine.
#[derive(Default)]
struct Faults {
    /// Fail the n-th `set` of a write transaction (1-based, 0 = never).
    fail_set_at: AtomicUsize,
    fail_reads: AtomicBool,
    fail_maintenance: AtomicBool,
    maintenance_calls: AtomicUsize,
    dropped: AtomicBool,
}

/// Memory engine that fails on demand.
struct FlakyEngine {
    inner: MemoryEngine,
    faults: Arc<Faults>,
}

impl FlakyEngine {
    fn new() -> (Self, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        let engine = Self {
            inner: MemoryEngine::new(),
            faults: Arc::clone(&faults),
        };
        (engine, faults)
    }
}

impl Drop for FlakyEngine {
    fn drop(&mut self) {
        self.faults.dropped.store(true, Ordering::SeqCst);
    }
}

struct FlakyTxn<'a, 'b> {
    inner: &'a mut (dyn WriteTxn + 'b),
    fail_at: usize,
    sets: usize,
}

impl ReadTxn for FlakyTxn<'_, '_> {
    fn get(&self, key: &[u8]) -> KvxResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }
}

impl WriteTxn for FlakyTxn<'_, '_> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> KvxResult<()> {
        self.sets += 1;
        if self.sets == self.fail_at {
            return Err(KvxError::Storage("injected write fault".to_string()));
        }
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> KvxResult<()> {
        self.inner.delete(key)
    }
}

impl StoreEngine for FlakyEngine {
    type Cursor = MemoryCursor;

    fn view<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&dyn ReadTxn) -> KvxResult<T>,
    {
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(KvxError::Storage("injected read fault".to_string()));
        }
        self.inner.view(f)
    }

    fn update<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> KvxResult<T>,
    {
        let fail_at = self.faults.fail_set_at.load(Ordering::SeqCst);
        self.inner.update(|txn| {
            let mut flaky = FlakyTxn {
                inner: txn,
                fail_at,
                sets: 0,
            };
            f(&mut flaky)
        })
    }

    fn cursor(&self) -> KvxResult<MemoryCursor> {
        self.inner.cursor()
    }

    fn prefix_cursor(&self, prefix: &[u8]) -> KvxResult<MemoryCursor> {
        self.inner.prefix_cursor(prefix)
    }

    fn purge_old_versions(&self) -> KvxResult<()> {
        self.faults.maintenance_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_maintenance.load(Ordering::SeqCst) {
            return Err(KvxError::Storage("injected purge fault".to_string()));
        }
        self.inner.purge_old_versions()
    }

    fn run_value_log_gc(&self, discard_ratio: f64) -> KvxResult<()> {
        self.inner.run_value_log_gc(discard_ratio)
    }

    fn close(&self) -> KvxResult<()> {
        self.inner.close()
    }
}

fn quiet_config() -> StoreConfig {
    StoreConfig::new("flaky").with_reclaim(false)
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_failed_batch_applies_nothing() -> KvxResult<()> {
    let (engine, faults) = FlakyEngine::new();
    let store = KvStore::with_engine(engine, &quiet_config(), Arc::new(NoopMetrics))?;
    faults.fail_set_at.store(2, Ordering::SeqCst);

    let mut batch = store.new_batch();
    batch.put(b"a", b"1")?;
    batch.put(b"b", b"2")?;
    batch.put(b"c", b"3")?;
    assert!(batch.write().is_err());
    assert!(batch.is_empty());
    assert_eq!(batch.value_size(), 0);

    faults.fail_set_at.store(0, Ordering::SeqCst);
    for key in [b"a", b"b", b"c"] {
        assert!(!store.has(key)?);
    }
    Ok(())
}

#[test]
fn test_failed_put_surfaces_error() -> KvxResult<()> {
    let (engine, faults) = FlakyEngine::new();
    let store = KvStore::with_engine(engine, &quiet_config(), Arc::new(NoopMetrics))?;
    faults.fail_set_at.store(1, Ordering::SeqCst);
    assert!(matches!(store.put(b"k", b"v"), Err(KvxError::Storage(_))));

    faults.fail_set_at.store(0, Ordering::SeqCst);
    assert!(!store.has(b"k")?);
    Ok(())
}

#[test]
fn test_read_fault_counts_as_miss() -> KvxResult<()> {
    let registry = Arc::new(MetricsRegistry::new());
    let (engine, faults) = FlakyEngine::new();
    let store = KvStore::with_engine(engine, &quiet_config(), registry.clone())?;
    store.meter("flaky/");
    store.put(b"k", b"v")?;

    faults.fail_reads.store(true, Ordering::SeqCst);
    assert!(matches!(store.get(b"k"), Err(KvxError::Storage(_))));
    assert!(store.has(b"k").is_err());

    let snap = registry.snapshot();
    assert_eq!(snap.meter("flaky/user/misses").total, 1);
    assert_eq!(snap.meter("flaky/user/reads").total, 0);
    assert_eq!(snap.timer("flaky/user/gets").count, 1);
    Ok(())
}

#[test]
fn test_reclaim_failures_do_not_surface() -> KvxResult<()> {
    let (engine, faults) = FlakyEngine::new();
    faults.fail_maintenance.store(true, Ordering::SeqCst);
    let config = quiet_config()
        .with_reclaim(true)
        .with_reclaim_interval(Duration::from_millis(10));
    let store = KvStore::with_engine(engine, &config, Arc::new(NoopMetrics))?;

    assert!(wait_for(|| store
        .reclaim_stats()
        .is_some_and(|stats| stats.failures >= 2)));

    // foreground traffic is unaffected
    store.put(b"k", b"v")?;
    assert_eq!(store.get(b"k")?, b"v");

    // an explicit cycle does report the fault
    assert!(store.collect_garbage().is_err());

    faults.fail_maintenance.store(false, Ordering::SeqCst);
    let before = store.reclaim_stats().map(|s| s.cycles).unwrap_or(0);
    assert!(wait_for(|| store
        .reclaim_stats()
        .is_some_and(|stats| stats.cycles > before + 1)));
    Ok(())
}

#[test]
fn test_close_quiesces_reclaim_thread() -> KvxResult<()> {
    let config = quiet_config()
        .with_reclaim(true)
        .with_reclaim_interval(Duration::from_secs(3600))
        .with_close_timeout(Duration::from_secs(5));
    let (engine, faults) = FlakyEngine::new();
    let store = Arc::new(KvStore::with_engine(engine, &config, Arc::new(NoopMetrics))?);
    let shared = Arc::clone(&store);
    assert!(store.reclaim_stats().is_some());

    let started = Instant::now();
    store.close();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(store.reclaim_stats().is_none());
    assert_eq!(faults.maintenance_calls.load(Ordering::SeqCst), 0);
    assert!(matches!(store.put(b"k", b"v"), Err(KvxError::Closed)));

    // the engine is gone even though another handle to the store is alive
    assert!(faults.dropped.load(Ordering::SeqCst));
    assert!(shared.is_closed());
    Ok(())
}

#[test]
fn test_failed_put_is_still_metered() -> KvxResult<()> {
    let registry = Arc::new(MetricsRegistry::new());
    let (engine, faults) = FlakyEngine::new();
    let store = KvStore::with_engine(engine, &quiet_config(), registry.clone())?;
    store.meter("flaky/");

    faults.fail_set_at.store(1, Ordering::SeqCst);
    let value = b"twelve bytes";
    assert!(store.put(b"k", value).is_err());

    let snap = registry.snapshot();
    assert_eq!(snap.timer("flaky/user/puts").count, 1);
    assert_eq!(snap.meter("flaky/user/writes").total, value.len() as u64);
    Ok(())
}
