//! # KVX: Compressed Key-Value Store
//!
//! KVX is a storage layer over an embedded transactional key-value engine.
//! Values are compressed on the way in, reads and writes are instrumented,
//! and a background thread periodically reclaims space.
//!
//! ## Features
//!
//! - **Store contract**: put / has / get / delete, atomic write batches,
//!   snapshot cursors
//! - **Value codec**: zstd by default, pluggable via [`ValueCodec`]
//! - **Namespaces**: [`Table`] scopes keys under a byte prefix
//! - **Metrics**: latency timers and byte meters through an injected sink
//! - **Reclaim**: periodic purge + value-log GC, cancellable on close
//!
//! ## Quick start
//!
//! ```rust
//! use kvx_core::{KvStore, Store, Table};
//! use std::sync::Arc;
//!
//! # fn main() -> kvx_core::KvxResult<()> {
//! let db = Arc::new(KvStore::open_in_memory()?);
//!
//! // batched writes become visible together
//! let mut batch = db.new_batch();
//! batch.put(b"k1", b"v1")?;
//! batch.put(b"k2", b"v2")?;
//! batch.write()?;
//! assert_eq!(db.get(b"k2")?, b"v2");
//!
//! // tables share the store under a prefix
//! let table = Table::new(db.clone(), "tbl-");
//! table.put(b"a", b"1")?;
//! assert_eq!(db.get(b"tbl-a")?, b"1");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`store`]: [`Store`] contract, [`KvStore`], batches, cursors, tables
//! - [`engine`]: engine seam with sled and in-memory implementations
//! - [`codec`]: value codecs and compression settings
//! - [`metrics`]: timer/meter traits and an in-memory registry
//! - [`reclaim`]: background space reclamation
//! - [`config`]: [`StoreConfig`]

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod reclaim;
pub mod store;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use codec::{CompressionAlgorithm, CompressionConfig, IdentityCodec, ValueCodec, ZstdCodec};
pub use config::{LoadMode, StoreConfig};
pub use engine::{MemoryEngine, SledEngine, StoreEngine};
pub use error::{KvxError, KvxResult};
pub use metrics::{Meter, MetricsRegistry, MetricsSink, NoopMetrics, Timer};
pub use reclaim::{ReclaimPolicy, ReclaimScheduler, ReclaimStats};
pub use store::{
    Batch, Cursor, KvBatch, KvIterator, KvStore, Store, Table, TableBatch, TableIterator,
    new_table_batch,
};
