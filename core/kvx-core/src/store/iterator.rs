//! Snapshot cursors.
//!
//! A cursor is bound to the engine snapshot taken when it was created. The
//! first `next` rewinds to the smallest key; `seek` positions directly.
//! Values are returned as stored, i.e. still encoded; use
//! [`Cursor::decoded_value`] to run them through the store's codec.

use crate::codec::ValueCodec;
use crate::engine::{EngineCursor, StoreEngine};
use crate::error::{KvxError, KvxResult};
use std::sync::Arc;

/// Forward iterator over a store snapshot.
pub trait KvIterator {
    /// Advance to the next entry. Returns `false` once exhausted or released.
    fn next(&mut self) -> bool;

    /// Position at the first key `>= key`.
    fn seek(&mut self, key: &[u8]);

    fn key(&self) -> Option<&[u8]>;

    /// Stored bytes of the current entry.
    fn value(&self) -> Option<&[u8]>;

    /// Drop the underlying snapshot. Idempotent.
    fn release(&mut self);

    fn released(&self) -> bool;
}

/// Cursor over a [`KvStore`](crate::store::KvStore) snapshot.
pub struct Cursor<E: StoreEngine> {
    inner: Option<E::Cursor>,
    codec: Arc<dyn ValueCodec>,
    initialised: bool,
}

impl<E: StoreEngine> Cursor<E> {
    pub(crate) fn new(inner: E::Cursor, codec: Arc<dyn ValueCodec>) -> Self {
        Self {
            inner: Some(inner),
            codec,
            initialised: false,
        }
    }

    fn positioned(&self) -> Option<&E::Cursor> {
        self.inner
            .as_ref()
            .filter(|cursor| self.initialised && cursor.valid())
    }

    /// Decoded value of the current entry.
    pub fn decoded_value(&self) -> KvxResult<Vec<u8>> {
        let cursor = self
            .positioned()
            .ok_or_else(|| KvxError::Storage("cursor is not positioned".to_string()))?;
        self.codec.decode(cursor.value()?)
    }
}

impl<E: StoreEngine> KvIterator for Cursor<E> {
    fn next(&mut self) -> bool {
        let Some(cursor) = self.inner.as_mut() else {
            return false;
        };
        if self.initialised {
            cursor.next();
        } else {
            cursor.rewind();
            self.initialised = true;
        }
        cursor.valid()
    }

    fn seek(&mut self, key: &[u8]) {
        if let Some(cursor) = self.inner.as_mut() {
            cursor.seek(key);
            self.initialised = true;
        }
    }

    fn key(&self) -> Option<&[u8]> {
        self.positioned()?.key()
    }

    fn value(&self) -> Option<&[u8]> {
        self.positioned()?.value().ok()
    }

    fn release(&mut self) {
        self.inner = None;
    }

    fn released(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, Store};

    fn store_with(keys: &[&[u8]]) -> KvxResult<KvStore<crate::engine::MemoryEngine>> {
        let store = KvStore::open_in_memory()?;
        for key in keys {
            store.put(key, key)?;
        }
        Ok(store)
    }

    #[test]
    fn walks_in_key_order() -> KvxResult<()> {
        let store = store_with(&[b"b", b"c", b"a"])?;
        let mut cursor = store.new_cursor()?;
        assert_eq!(cursor.key(), None);

        let mut seen = Vec::new();
        while cursor.next() {
            seen.push(cursor.key().unwrap().to_vec());
            assert_eq!(cursor.decoded_value()?, cursor.key().unwrap());
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(!cursor.next());
        assert_eq!(cursor.value(), None);
        Ok(())
    }

    #[test]
    fn seek_positions_on_entry() -> KvxResult<()> {
        let store = store_with(&[b"a", b"c", b"e"])?;
        let mut cursor = store.new_cursor()?;
        cursor.seek(b"b");
        assert_eq!(cursor.key(), Some(&b"c"[..]));
        assert!(cursor.next());
        assert_eq!(cursor.key(), Some(&b"e"[..]));
        assert!(!cursor.next());

        cursor.seek(b"a");
        assert_eq!(cursor.key(), Some(&b"a"[..]));
        cursor.seek(b"f");
        assert_eq!(cursor.key(), None);
        Ok(())
    }

    #[test]
    fn values_are_raw() -> KvxResult<()> {
        let store = KvStore::open_in_memory()?;
        let value = vec![7u8; 512];
        store.put(b"k", &value)?;

        let mut cursor = store.new_cursor()?;
        assert!(cursor.next());
        let raw = cursor.value().unwrap().to_vec();
        assert_ne!(raw, value);
        assert_eq!(store.codec().decode(&raw)?, value);
        assert_eq!(cursor.decoded_value()?, value);
        Ok(())
    }

    #[test]
    fn empty_value_is_some() -> KvxResult<()> {
        let store = KvStore::open_in_memory()?.with_codec(Arc::new(crate::codec::IdentityCodec));
        store.put(b"k", b"")?;
        let mut cursor = store.new_cursor()?;
        assert!(cursor.next());
        assert_eq!(cursor.value(), Some(&b""[..]));
        Ok(())
    }

    #[test]
    fn release_is_idempotent() -> KvxResult<()> {
        let store = store_with(&[b"a"])?;
        let mut cursor = store.new_cursor()?;
        assert!(cursor.next());
        cursor.release();
        cursor.release();
        assert!(cursor.released());
        assert!(!cursor.next());
        assert_eq!(cursor.key(), None);
        assert_eq!(cursor.value(), None);
        assert!(cursor.decoded_value().is_err());
        Ok(())
    }

    #[test]
    fn snapshot_ignores_later_writes() -> KvxResult<()> {
        let store = store_with(&[b"a"])?;
        let mut iter = store.new_iterator()?;
        store.put(b"b", b"b")?;
        store.delete(b"a")?;

        assert!(iter.next());
        assert_eq!(iter.key(), Some(&b"a"[..]));
        assert!(!iter.next());
        Ok(())
    }
}
