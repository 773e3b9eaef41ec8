//! Background space reclamation.
//!
//! One thread per store wakes every `interval`, purges old versions and then
//! runs value-log GC. Failures are logged and counted; the loop simply waits
//! for the next tick.
//!
//! # Shutdown
//!
//! The thread holds only a weak reference to the engine and upgrades it for
//! the length of one cycle, so closing the store releases the engine even
//! while the thread winds down. It listens on a stop channel and drops its
//! end of a done channel on exit. [`ReclaimScheduler::shutdown`] signals stop and waits on the
//! done channel for at most the given timeout, so a cycle in flight can
//! finish before the engine is closed.

use crate::config::StoreConfig;
use crate::engine::StoreEngine;
use crate::error::KvxResult;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// When and how aggressively to reclaim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReclaimPolicy {
    pub interval: Duration,
    pub discard_ratio: f64,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            interval: crate::config::DEFAULT_RECLAIM_INTERVAL,
            discard_ratio: crate::config::DEFAULT_DISCARD_RATIO,
        }
    }
}

impl From<&StoreConfig> for ReclaimPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            interval: config.reclaim_interval,
            discard_ratio: config.discard_ratio,
        }
    }
}

/// Cycle counters of a running scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that ended in an error.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    failures: AtomicU64,
}

/// One reclaim cycle: purge old versions, then value-log GC.
pub fn collect_garbage<E: StoreEngine>(engine: &E, discard_ratio: f64) -> KvxResult<()> {
    engine.purge_old_versions()?;
    engine.run_value_log_gc(discard_ratio)
}

/// Handle to the background reclaim thread.
pub struct ReclaimScheduler {
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl ReclaimScheduler {
    /// Spawn the reclaim thread for `engine`. The loop ends on its own once
    /// every strong reference to the engine is gone.
    pub fn start<E: StoreEngine>(engine: &Arc<E>, policy: ReclaimPolicy) -> KvxResult<Self> {
        let engine = Arc::downgrade(engine);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let handle = std::thread::Builder::new()
            .name("kvx-reclaim".to_string())
            .spawn(move || {
                run_loop(&engine, policy, &stop_rx, &worker_counters);
                drop(done_tx);
            })?;
        debug!(interval = ?policy.interval, discard_ratio = policy.discard_ratio, "reclaim scheduler started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
            counters,
        })
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Stop the loop and wait up to `timeout` for it to exit.
    ///
    /// Returns `true` if the thread quiesced in time. On timeout the thread
    /// is detached; it exits after its current cycle.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.signal_stop();
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take()
                    && handle.join().is_err()
                {
                    error!("reclaim thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "reclaim thread still busy, detaching");
                self.handle.take();
                false
            }
        }
    }

    fn signal_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

impl Drop for ReclaimScheduler {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

fn run_loop<E: StoreEngine>(
    engine: &Weak<E>,
    policy: ReclaimPolicy,
    stop_rx: &Receiver<()>,
    counters: &Counters,
) {
    loop {
        match stop_rx.recv_timeout(policy.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(engine) = engine.upgrade() else {
            break;
        };
        counters.cycles.fetch_add(1, Ordering::Relaxed);
        info!("Start garbage collecting...");
        match collect_garbage(engine.as_ref(), policy.discard_ratio) {
            Ok(()) => info!("Garbage collected"),
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Failed to collect garbage");
            }
        }
    }
    debug!("reclaim scheduler stopped");
}
