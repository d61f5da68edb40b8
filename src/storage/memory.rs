//! In-process storage backend

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::Result;

use super::Store;

/// In-process store with no cross-process visibility
///
/// Useful for tests and for single-process setups where several components
/// share one `Arc<MemoryStore>`.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value synchronously, bypassing the async port
    ///
    /// Intended for wiring up fixtures; production writers go through
    /// [`Store::write`].
    pub fn insert(&self, key: &str, value: Bytes) {
        self.entries.write().insert(key.to_string(), value);
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write(&self, key: &str, value: Bytes) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();

        store.write("counter", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(
            store.read("counter").await.unwrap(),
            Some(Bytes::from_static(b"1"))
        );
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let store = MemoryStore::new();

        store.write("counter", Bytes::from_static(b"1")).await.unwrap();
        store.write("counter", Bytes::from_static(b"2")).await.unwrap();

        assert_eq!(
            store.read("counter").await.unwrap(),
            Some(Bytes::from_static(b"2"))
        );
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let store = MemoryStore::new();

        store.delete("missing").await.unwrap();
        assert_eq!(store.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = MemoryStore::new();
        store.write("a", Bytes::from_static(b"1")).await.unwrap();
        store.write("b", Bytes::from_static(b"2")).await.unwrap();

        store.delete_all().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(store.read("a").await.unwrap(), None);
    }
}
