//! Engine module: the embedded transactional key-value engine seam.
//!
//! The store layer depends only on [`StoreEngine`]; concrete engines are
//! [`SledEngine`] (persistent) and [`MemoryEngine`] (in-process).
//!
//! # Contract
//!
//! - `view`: read-only transaction; `get` returns `None` for absent keys.
//! - `update`: write transaction; all writes made through the `WriteTxn`
//!   become visible atomically when the closure returns `Ok`, and none do
//!   when it returns `Err`. Reads inside the closure see its own writes.
//! - `cursor`: snapshot taken at call time; later writes are invisible to it.
//! - `prefix_cursor`: same, restricted to keys starting with the prefix.
//! - `purge_old_versions` / `run_value_log_gc`: maintenance hooks driven by
//!   the reclaim scheduler. They must be safe to call concurrently with
//!   foreground traffic.
//! - `close`: final flush/release; the store issues nothing afterwards.

pub mod memory;
pub mod sled_engine;

pub use memory::MemoryEngine;
pub use sled_engine::SledEngine;

use crate::error::{KvxError, KvxResult};

/// Read access inside a transaction.
pub trait ReadTxn {
    fn get(&self, key: &[u8]) -> KvxResult<Option<Vec<u8>>>;

    fn contains(&self, key: &[u8]) -> KvxResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Write access inside a transaction.
pub trait WriteTxn: ReadTxn {
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> KvxResult<()>;

    /// Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> KvxResult<()>;
}

/// Forward iteration over an engine snapshot.
pub trait EngineCursor: Send {
    /// Position at the smallest key.
    fn rewind(&mut self);

    /// Position at the first key `>= key`.
    fn seek(&mut self, key: &[u8]);

    /// Advance one entry. No-op once exhausted.
    fn next(&mut self);

    fn valid(&self) -> bool;

    fn key(&self) -> Option<&[u8]>;

    /// Raw stored bytes at the current position.
    fn value(&self) -> KvxResult<&[u8]>;
}

/// The embedded engine consumed by [`KvStore`](crate::store::KvStore).
pub trait StoreEngine: Send + Sync + 'static {
    type Cursor: EngineCursor + 'static;

    /// Run `f` inside a read transaction.
    fn view<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&dyn ReadTxn) -> KvxResult<T>;

    /// Run `f` inside a write transaction, committing only on `Ok`.
    fn update<T, F>(&self, f: F) -> KvxResult<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> KvxResult<T>;

    /// Open a cursor over a snapshot of the current contents.
    fn cursor(&self) -> KvxResult<Self::Cursor>;

    /// Snapshot cursor that only sees keys starting with `prefix`. Seeking
    /// below the prefix positions at its first key.
    fn prefix_cursor(&self, prefix: &[u8]) -> KvxResult<Self::Cursor>;

    /// Drop superseded versions the engine still retains.
    fn purge_old_versions(&self) -> KvxResult<()>;

    /// Rewrite log segments whose stale fraction is at least `discard_ratio`.
    fn run_value_log_gc(&self, discard_ratio: f64) -> KvxResult<()>;

    fn close(&self) -> KvxResult<()>;
}

/// Shared argument check for `run_value_log_gc` implementations.
pub(crate) fn check_discard_ratio(discard_ratio: f64) -> KvxResult<()> {
    if discard_ratio > 0.0 && discard_ratio < 1.0 {
        Ok(())
    } else {
        Err(KvxError::InvalidArguments(format!(
            "discard ratio must be in (0, 1), got {}",
            discard_ratio
        )))
    }
}
