//! Write batches: accumulate puts in memory, flush atomically.

use crate::engine::StoreEngine;
use crate::error::KvxResult;
use crate::metrics::TimerGuard;
use crate::store::{KvStore, mark};
use std::collections::HashMap;

/// Write-only batch that commits when [`write`](Batch::write) is called.
pub trait Batch {
    /// Queue `value` under `key`, replacing any value queued for the same key.
    fn put(&mut self, key: &[u8], value: &[u8]) -> KvxResult<()>;

    /// Flush everything queued in one engine transaction.
    ///
    /// The batch is empty afterwards whether or not the flush succeeded.
    fn write(&mut self) -> KvxResult<()>;

    /// Value bytes queued since the last flush or reset.
    fn value_size(&self) -> usize;

    /// Distinct keys queued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reset(&mut self);

    /// Same as [`reset`](Batch::reset).
    fn discard(&mut self) {
        self.reset();
    }
}

/// Batch bound to a [`KvStore`].
pub struct KvBatch<'a, E: StoreEngine> {
    store: &'a KvStore<E>,
    writes: HashMap<Vec<u8>, Vec<u8>>,
    size: usize,
}

impl<'a, E: StoreEngine> KvBatch<'a, E> {
    pub fn new(store: &'a KvStore<E>) -> Self {
        Self {
            store,
            writes: HashMap::new(),
            size: 0,
        }
    }

    fn commit(&self) -> KvxResult<()> {
        let store = self.store;
        store.engine()?.update(|txn| {
            for (key, value) in &self.writes {
                let encoded = store.codec().encode(value)?;
                txn.set(key, encoded)?;
            }
            Ok(())
        })
    }
}

impl<E: StoreEngine> Batch for KvBatch<'_, E> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> KvxResult<()> {
        let meters = self.store.meters();
        let _timer = TimerGuard::start(meters.batch_put_timer.as_deref());

        self.writes.insert(key.to_vec(), value.to_vec());
        self.size += value.len();
        Ok(())
    }

    fn write(&mut self) -> KvxResult<()> {
        let meters = self.store.meters();
        let _timer = TimerGuard::start(meters.batch_write_timer.as_deref());
        mark(&meters.batch_write_meter, self.size);

        let result = self.commit();
        self.reset();
        result
    }

    fn value_size(&self) -> usize {
        self.size
    }

    fn len(&self) -> usize {
        self.writes.len()
    }

    fn reset(&mut self) {
        self.writes.clear();
        self.size = 0;
    }
}
