//! In-memory store for tests and embedding

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// In-memory implementation of [`Store`]
///
/// Shared through an `Arc`, it also serves as the "disk" that survives a
/// simulated process restart in tests: build a new manager over the same
/// store and it sees everything the old one persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("roles/a", b"one".to_vec()).await.unwrap();
        assert_eq!(store.get("roles/a").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.len(), 1);

        store.put("roles/a", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("roles/a").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);

        store.delete("roles/a").await.unwrap();
        assert!(store.get("roles/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("nothing").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("roles/a", vec![]).await.unwrap();
        store.put("roles/b", vec![]).await.unwrap();
        store.put("wal/a", vec![]).await.unwrap();

        let mut keys = store.list("roles/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["roles/a".to_string(), "roles/b".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = MemoryStore::new();
        let err = store.put("", vec![1]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }
}
