//! In-memory engine using a copy-on-write BTreeMap
//!
//! Write transactions hold the write lock for their whole duration, so
//! writers serialize. Cursors share the current map through an `Arc`; the
//! next writer clones it instead of mutating a snapshot in place.

use crate::engine::{EngineCursor, ReadTxn, StoreEngine, WriteTxn, check_discard_ratio};
use crate::error::{KvxError, KvxResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory engine
#[derive(Default)]
pub struct MemoryEngine {
    data: RwLock<Arc<Map>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

struct MemoryReadTxn<'a> {
    map: &'a Map,
}

impl ReadTxn for MemoryReadTxn<'_> {
    fn get(&self, key: &[u8]) -> KvxResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }
}

struct MemoryWriteTxn<'a> {
    base: &'a Map,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl ReadTxn for MemoryWriteTxn<'_> {
    fn get(&self, key: &[u8]) -> KvxResult<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.base.get(key).cloned()),
        }
    }
}

impl WriteTxn for MemoryWriteTxn<'_> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> KvxResult<()> {
        self.pending.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> KvxResult<()> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }
}

/// Cursor over a shared snapshot of the map, limited to `prefix`.
pub struct MemoryCursor {
    snapshot: Arc<Map>,
    prefix: Vec<u8>,
    current: Option<Vec<u8>>,
}

impl MemoryCursor {
    fn position(&mut self, lower: Bound<&[u8]>) {
        self.current = self
            .snapshot
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with(&self.prefix))
            .cloned();
    }
}

impl EngineCursor for MemoryCursor {
    fn rewind(&mut self) {
        let prefix = std::mem::take(&mut self.prefix);
        self.position(Bound::Included(prefix.as_slice()));
        self.prefix = prefix;
    }

    fn seek(&mut self, key: &[u8]) {
        let prefix = std::mem::take(&mut self.prefix);
        self.position(Bound::Included(key.max(prefix.as_slice())));
        self.prefix = prefix;
    }

    fn next(&mut self) {
        if let Some(current) = self.current.take() {
            self.position(Bound::Excluded(current.as_slice()));
        }
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_deref()
    }

    fn value(&self) -> KvxResult<&[u8]> {
        self.current
            .as_ref()
            .and_then(|k| self.snapshot.get(k))
            .map(Vec::as_slice)
            .ok_or_else(|| KvxError::Storage("cursor is not positioned".to_string()))
    }
}

impl StoreEngine for MemoryEngine {
    type Cursor = MemoryCursor;

    fn view<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&dyn ReadTxn) -> KvxResult<T>,
    {
        let guard = self.data.read();
        f(&MemoryReadTxn { map: &guard })
    }

    fn update<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> KvxResult<T>,
    {
        let mut guard = self.data.write();
        let mut txn = MemoryWriteTxn {
            base: &guard,
            pending: BTreeMap::new(),
        };
        let out = f(&mut txn)?;
        let MemoryWriteTxn { pending, .. } = txn;
        if pending.is_empty() {
            return Ok(out);
        }

        let map = Arc::make_mut(&mut guard);
        for (key, value) in pending {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(out)
    }

    fn cursor(&self) -> KvxResult<MemoryCursor> {
        self.prefix_cursor(&[])
    }

    fn prefix_cursor(&self, prefix: &[u8]) -> KvxResult<MemoryCursor> {
        Ok(MemoryCursor {
            snapshot: self.data.read().clone(),
            prefix: prefix.to_vec(),
            current: None,
        })
    }

    fn purge_old_versions(&self) -> KvxResult<()> {
        // No-op: the map holds one version per key
        Ok(())
    }

    fn run_value_log_gc(&self, discard_ratio: f64) -> KvxResult<()> {
        check_discard_ratio(discard_ratio)
    }

    fn close(&self) -> KvxResult<()> {
        Ok(())
    }
}
