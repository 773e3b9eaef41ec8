//! sled-backed engine, durable B+Tree storage.
//!
//! Write transactions buffer their mutations and commit them with a single
//! `apply_batch`, which sled applies atomically. Cursors materialize the
//! tree at creation time: sled iterators are not snapshot-isolated, and a
//! cursor must not observe writes issued after it was opened.

use crate::config::StoreConfig;
use crate::engine::{EngineCursor, ReadTxn, StoreEngine, WriteTxn, check_discard_ratio};
use crate::error::{KvxError, KvxResult};
use sled::IVec;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Persistent engine over a single sled tree.
pub struct SledEngine {
    db: sled::Db,
    sync_writes: bool,
}

impl SledEngine {
    /// Open the engine described by `config`.
    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub fn open(config: &StoreConfig) -> KvxResult<Self> {
        std::fs::create_dir_all(&config.path)?;

        let flush_every = if config.sync_writes {
            None
        } else {
            Some(config.flush_every_ms)
        };
        let mut sled_config = sled::Config::new()
            .path(&config.path)
            .mode(config.load_mode.into())
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(flush_every);
        if let Some(size) = config.segment_size {
            sled_config = sled_config.segment_size(size);
        }

        let db = sled_config.open()?;
        info!(recovered = db.was_recovered(), "sled engine opened");
        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    /// Open at `path` with default settings.
    pub fn open_path(path: &Path) -> KvxResult<Self> {
        Self::open(&StoreConfig::new(path))
    }

    /// Open a temporary engine (for testing). Data is deleted on drop.
    pub fn open_temporary() -> KvxResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            sync_writes: false,
        })
    }

    /// Bytes the engine currently occupies on disk.
    pub fn size_on_disk(&self) -> KvxResult<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

struct SledReadTxn<'a> {
    db: &'a sled::Db,
}

impl ReadTxn for SledReadTxn<'_> {
    fn get(&self, key: &[u8]) -> KvxResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn contains(&self, key: &[u8]) -> KvxResult<bool> {
        Ok(self.db.contains_key(key)?)
    }
}

/// Buffered writes; `None` marks a removal.
struct SledWriteTxn<'a> {
    db: &'a sled::Db,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl ReadTxn for SledWriteTxn<'_> {
    fn get(&self, key: &[u8]) -> KvxResult<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.db.get(key)?.map(|ivec| ivec.to_vec())),
        }
    }
}

impl WriteTxn for SledWriteTxn<'_> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> KvxResult<()> {
        self.pending.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> KvxResult<()> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }
}

/// Cursor over a materialized snapshot.
pub struct SledCursor {
    entries: Vec<(IVec, IVec)>,
    pos: usize,
}

impl EngineCursor for SledCursor {
    fn rewind(&mut self) {
        self.pos = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.pos = self.entries.partition_point(|(k, _)| &k[..] < key);
    }

    fn next(&mut self) {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
    }

    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn key(&self) -> Option<&[u8]> {
        self.entries.get(self.pos).map(|(k, _)| &k[..])
    }

    fn value(&self) -> KvxResult<&[u8]> {
        self.entries
            .get(self.pos)
            .map(|(_, v)| &v[..])
            .ok_or_else(|| KvxError::Storage("cursor is not positioned".to_string()))
    }
}

impl StoreEngine for SledEngine {
    type Cursor = SledCursor;

    fn view<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&dyn ReadTxn) -> KvxResult<T>,
    {
        f(&SledReadTxn { db: &self.db })
    }

    fn update<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> KvxResult<T>,
    {
        let mut txn = SledWriteTxn {
            db: &self.db,
            pending: BTreeMap::new(),
        };
        let out = f(&mut txn)?;
        if txn.pending.is_empty() {
            return Ok(out);
        }

        let mut batch = sled::Batch::default();
        for (key, value) in txn.pending {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        if self.sync_writes {
            self.db.flush()?;
        }
        Ok(out)
    }

    fn cursor(&self) -> KvxResult<SledCursor> {
        let entries = self.db.iter().collect::<Result<Vec<_>, _>>()?;
        Ok(SledCursor { entries, pos: 0 })
    }

    fn prefix_cursor(&self, prefix: &[u8]) -> KvxResult<SledCursor> {
        let entries = self.db.scan_prefix(prefix).collect::<Result<Vec<_>, _>>()?;
        Ok(SledCursor { entries, pos: 0 })
    }

    /// sled keeps superseded page versions until dirty pages are written
    /// out; a flush lets its segment cleaner drop them.
    fn purge_old_versions(&self) -> KvxResult<()> {
        let flushed = self.db.flush()?;
        debug!(flushed_bytes = flushed, "purged old versions");
        Ok(())
    }

    /// sled relocates live pages out of sparse segments on its own once they
    /// are written out, so the ratio is only validated here and the call
    /// drives a flush.
    fn run_value_log_gc(&self, discard_ratio: f64) -> KvxResult<()> {
        check_discard_ratio(discard_ratio)?;
        let before = self.db.size_on_disk()?;
        self.db.flush()?;
        let after = self.db.size_on_disk()?;
        debug!(discard_ratio, before, after, "value log gc finished");
        Ok(())
    }

    fn close(&self) -> KvxResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
