//! Namespaced views over a shared store.
//!
//! A [`Table`] prepends a fixed prefix to every key and delegates to the
//! store underneath. Prefixes are concatenated verbatim, so writing `x`
//! through a table with prefix `A/` touches exactly the physical key `A/x`.

use crate::error::KvxResult;
use crate::store::{Batch, KvIterator, Store};
use std::sync::Arc;

fn prefixed(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(prefix.len() + key.len());
    full.extend_from_slice(prefix);
    full.extend_from_slice(key);
    full
}

/// Store view that scopes every key under `prefix`.
pub struct Table {
    db: Arc<dyn Store>,
    prefix: Vec<u8>,
}

impl Table {
    pub fn new(db: Arc<dyn Store>, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.db
    }
}

impl Store for Table {
    fn put(&self, key: &[u8], value: &[u8]) -> KvxResult<()> {
        self.db.put(&prefixed(&self.prefix, key), value)
    }

    fn has(&self, key: &[u8]) -> KvxResult<bool> {
        self.db.has(&prefixed(&self.prefix, key))
    }

    fn get(&self, key: &[u8]) -> KvxResult<Vec<u8>> {
        self.db.get(&prefixed(&self.prefix, key))
    }

    fn delete(&self, key: &[u8]) -> KvxResult<()> {
        self.db.delete(&prefixed(&self.prefix, key))
    }

    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(new_table_batch(self.db.as_ref(), &self.prefix))
    }

    fn new_iterator(&self) -> KvxResult<Box<dyn KvIterator + '_>> {
        self.new_prefix_iterator(&[])
    }

    fn new_prefix_iterator(&self, prefix: &[u8]) -> KvxResult<Box<dyn KvIterator + '_>> {
        let inner = self.db.new_prefix_iterator(&prefixed(&self.prefix, prefix))?;
        Ok(Box::new(TableIterator::new(inner, self.prefix.clone())))
    }

    /// The underlying store is shared; closing a table leaves it open.
    fn close(&self) {}
}

/// Batch that prefixes every key before queueing it on the inner batch.
pub struct TableBatch<'a> {
    batch: Box<dyn Batch + 'a>,
    prefix: Vec<u8>,
}

/// Batch over `db` writing under `prefix`, without building a [`Table`].
pub fn new_table_batch<'a>(db: &'a dyn Store, prefix: &[u8]) -> TableBatch<'a> {
    TableBatch {
        batch: db.new_batch(),
        prefix: prefix.to_vec(),
    }
}

impl Batch for TableBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> KvxResult<()> {
        self.batch.put(&prefixed(&self.prefix, key), value)
    }

    fn write(&mut self) -> KvxResult<()> {
        self.batch.write()
    }

    fn value_size(&self) -> usize {
        self.batch.value_size()
    }

    fn len(&self) -> usize {
        self.batch.len()
    }

    fn reset(&mut self) {
        self.batch.reset();
    }
}

/// Iterator limited to keys under a prefix, which it strips from `key`.
pub struct TableIterator<'a> {
    inner: Box<dyn KvIterator + 'a>,
    prefix: Vec<u8>,
    started: bool,
}

impl<'a> TableIterator<'a> {
    pub fn new(inner: Box<dyn KvIterator + 'a>, prefix: Vec<u8>) -> Self {
        Self {
            inner,
            prefix,
            started: false,
        }
    }

    fn in_scope(&self) -> bool {
        self.inner
            .key()
            .is_some_and(|key| key.starts_with(&self.prefix))
    }
}

impl KvIterator for TableIterator<'_> {
    fn next(&mut self) -> bool {
        if self.inner.released() {
            return false;
        }
        if self.started {
            if !self.in_scope() {
                return false;
            }
            self.inner.next();
        } else {
            self.inner.seek(&self.prefix);
            self.started = true;
        }
        self.in_scope()
    }

    fn seek(&mut self, key: &[u8]) {
        self.inner.seek(&prefixed(&self.prefix, key));
        self.started = true;
    }

    fn key(&self) -> Option<&[u8]> {
        let key = self.inner.key()?;
        key.strip_prefix(self.prefix.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        if self.in_scope() {
            self.inner.value()
        } else {
            None
        }
    }

    fn release(&mut self) {
        self.inner.release();
    }

    fn released(&self) -> bool {
        self.inner.released()
    }
}
