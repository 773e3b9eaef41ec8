//! Metrics sink abstraction.
//!
//! The store never talks to a global registry. A [`MetricsSink`] is injected
//! at construction and [`KvStore::meter`](crate::store::KvStore::meter) asks
//! it for named timers and meters. [`NoopMetrics`] is the default and
//! reports itself disabled, so metering is skipped entirely.
//!
//! [`MetricsRegistry`] is an in-process sink that accumulates counters and
//! can be inspected through [`MetricsRegistry::snapshot`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Latency recorder.
pub trait Timer: Send + Sync {
    fn update(&self, elapsed: Duration);

    fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }
}

/// Event/byte counter.
pub trait Meter: Send + Sync {
    fn mark(&self, count: u64);
}

/// Factory for named instruments.
pub trait MetricsSink: Send + Sync {
    /// When `false`, callers skip metering altogether.
    fn enabled(&self) -> bool;

    fn new_timer(&self, name: &str) -> Arc<dyn Timer>;

    fn new_meter(&self, name: &str) -> Arc<dyn Meter>;
}

/// Sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

struct NoopInstrument;

impl Timer for NoopInstrument {
    fn update(&self, _elapsed: Duration) {}
}

impl Meter for NoopInstrument {
    fn mark(&self, _count: u64) {}
}

impl MetricsSink for NoopMetrics {
    fn enabled(&self) -> bool {
        false
    }

    fn new_timer(&self, _name: &str) -> Arc<dyn Timer> {
        Arc::new(NoopInstrument)
    }

    fn new_meter(&self, _name: &str) -> Arc<dyn Meter> {
        Arc::new(NoopInstrument)
    }
}

/// Accumulated latency samples.
#[derive(Debug, Default)]
pub struct TimerStats {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl Timer for TimerStats {
    fn update(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }
}

/// Accumulated meter marks.
#[derive(Debug, Default)]
pub struct MeterStats {
    events: AtomicU64,
    total: AtomicU64,
}

impl Meter for MeterStats {
    fn mark(&self, count: u64) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(count, Ordering::Relaxed);
    }
}

/// Point-in-time copy of one timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimerSnapshot {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total.as_nanos() / u128::from(self.count);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Point-in-time copy of one meter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterSnapshot {
    /// Number of `mark` calls.
    pub events: u64,
    /// Sum of all marked counts.
    pub total: u64,
}

/// Point-in-time copy of a whole registry.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub timers: HashMap<String, TimerSnapshot>,
    pub meters: HashMap<String, MeterSnapshot>,
}

impl MetricsSnapshot {
    pub fn timer(&self, name: &str) -> TimerSnapshot {
        self.timers.get(name).copied().unwrap_or_default()
    }

    pub fn meter(&self, name: &str) -> MeterSnapshot {
        self.meters.get(name).copied().unwrap_or_default()
    }
}

/// In-process metrics sink.
///
/// Instruments are registered by name; asking for an existing name returns
/// the same instrument, so counters keep accumulating across re-metering.
#[derive(Default)]
pub struct MetricsRegistry {
    timers: RwLock<HashMap<String, Arc<TimerStats>>>,
    meters: RwLock<HashMap<String, Arc<MeterStats>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timers = self
            .timers
            .read()
            .iter()
            .map(|(name, t)| {
                (
                    name.clone(),
                    TimerSnapshot {
                        count: t.count.load(Ordering::Relaxed),
                        total: Duration::from_nanos(t.total_nanos.load(Ordering::Relaxed)),
                        max: Duration::from_nanos(t.max_nanos.load(Ordering::Relaxed)),
                    },
                )
            })
            .collect();
        let meters = self
            .meters
            .read()
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    MeterSnapshot {
                        events: m.events.load(Ordering::Relaxed),
                        total: m.total.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        MetricsSnapshot { timers, meters }
    }

    /// Registered instrument names, timers first.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timers.read().keys().cloned().collect();
        names.extend(self.meters.read().keys().cloned());
        names
    }
}

impl MetricsSink for MetricsRegistry {
    fn enabled(&self) -> bool {
        true
    }

    fn new_timer(&self, name: &str) -> Arc<dyn Timer> {
        let mut timers = self.timers.write();
        timers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TimerStats::default()))
            .clone()
    }

    fn new_meter(&self, name: &str) -> Arc<dyn Meter> {
        let mut meters = self.meters.write();
        meters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MeterStats::default()))
            .clone()
    }
}

/// Records the elapsed time into a timer when dropped.
pub(crate) struct TimerGuard<'a> {
    timer: Option<&'a dyn Timer>,
    start: Instant,
}

impl<'a> TimerGuard<'a> {
    pub(crate) fn start(timer: Option<&'a dyn Timer>) -> Self {
        Self {
            timer,
            start: Instant::now(),
        }
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer {
            timer.update_since(self.start);
        }
    }
}
