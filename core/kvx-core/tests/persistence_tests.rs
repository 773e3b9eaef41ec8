// On-disk behaviour: reopen, config files, compression settings

use kvx_core::error::KvxResult;
use kvx_core::{CompressionConfig, KvIterator, KvStore, Store, StoreConfig, Table};
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("db")).with_reclaim(false)
}

#[test]
fn test_data_survives_reopen() -> KvxResult<()> {
    let dir = TempDir::new()?;

    {
        let store = Arc::new(KvStore::open(config(&dir).with_sync_writes(true))?);
        store.put(b"k1", b"v1")?;
        let table = Table::new(store.clone(), "tbl-");
        let mut batch = table.new_batch();
        batch.put(b"a", b"1")?;
        batch.put(b"b", b"2")?;
        batch.write()?;
        store.delete(b"k1")?;
        store.put(b"k2", b"v2")?;
        store.close();
    }

    let store = KvStore::open(config(&dir))?;
    assert_eq!(store.path(), dir.path().join("db"));
    assert!(!store.has(b"k1")?);
    assert_eq!(store.get(b"k2")?, b"v2");
    assert_eq!(store.get(b"tbl-a")?, b"1");
    assert_eq!(store.get(b"tbl-b")?, b"2");

    let mut iter = store.new_iterator()?;
    let mut keys = Vec::new();
    while iter.next() {
        keys.push(iter.key().unwrap().to_vec());
    }
    assert_eq!(keys, vec![b"k2".to_vec(), b"tbl-a".to_vec(), b"tbl-b".to_vec()]);
    Ok(())
}

#[test]
fn test_reopen_after_close_while_shared() -> KvxResult<()> {
    let dir = TempDir::new()?;
    let first = Arc::new(KvStore::open(config(&dir).with_reclaim(true))?);
    let table = Table::new(first.clone(), "tbl-");
    let other = Arc::clone(&first);
    table.put(b"a", b"1")?;

    first.close();
    assert!(other.is_closed());

    // the sled file lock is released although handles to the first store remain
    let second = KvStore::open(config(&dir))?;
    assert_eq!(second.get(b"tbl-a")?, b"1");
    assert!(matches!(table.get(b"a"), Err(kvx_core::KvxError::Closed)));
    Ok(())
}

#[test]
fn test_open_from_json_config() -> KvxResult<()> {
    let dir = TempDir::new()?;
    let json = config(&dir)
        .with_compression(CompressionConfig::zstd_level(9))
        .to_json_string()?;
    let loaded = StoreConfig::from_json_str(&json)?;
    assert_eq!(loaded.compression.level(), Some(9));

    let store = KvStore::open(loaded)?;
    store.put(b"k", b"value")?;
    assert_eq!(store.get(b"k")?, b"value");
    Ok(())
}

#[test]
fn test_uncompressed_store_stores_plain_bytes() -> KvxResult<()> {
    let dir = TempDir::new()?;
    let store = KvStore::open(config(&dir).with_compression(CompressionConfig::none()))?;
    store.put(b"k", b"plain")?;

    let mut cursor = store.new_cursor()?;
    assert!(cursor.next());
    assert_eq!(cursor.value(), Some(&b"plain"[..]));
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = KvStore::open(config(&dir).with_discard_ratio(1.5));
    assert!(matches!(result, Err(kvx_core::KvxError::Config(_))));
}

#[test]
fn test_reclaim_runs_against_sled() -> KvxResult<()> {
    let dir = TempDir::new()?;
    let store = KvStore::open(
        config(&dir)
            .with_reclaim(true)
            .with_reclaim_interval(std::time::Duration::from_millis(10)),
    )?;
    for i in 0..200u32 {
        store.put(&i.to_be_bytes(), &[7u8; 256])?;
        store.delete(&i.to_be_bytes())?;
    }
    store.collect_garbage()?;

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while store.reclaim_stats().map_or(0, |s| s.cycles) == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let stats = store.reclaim_stats().unwrap();
    assert!(stats.cycles >= 1);
    assert_eq!(stats.failures, 0);
    store.close();
    Ok(())
}
