//! In-process implementation of [`KvStore`].
//!
//! Used by tests and by single-process dry runs. Semantics match the Redis
//! store: full-value overwrites, atomic set-if-absent, prefix scans.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::kv::KvStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let entries = self.entries.read().await;
        Ok(keys.iter().map(|k| entries.get(k).cloned()).collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{get_json, set_json};

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("2".to_string()));

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_if_absent_only_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("lock", "x").await.unwrap());
        assert!(!store.set_if_absent("lock", "y").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_scan_prefix_is_literal() {
        let store = MemoryStore::new();
        store.set("p:job:1", "a").await.unwrap();
        store.set("p:job:2", "b").await.unwrap();
        store.set("p:jobx", "c").await.unwrap();
        store.set("p:group:1", "d").await.unwrap();

        let keys = store.scan_prefix("p:job:").await.unwrap();
        assert_eq!(keys, vec!["p:job:1".to_string(), "p:job:2".to_string()]);
    }

    #[tokio::test]
    async fn test_get_many_aligned() {
        let store = MemoryStore::new();
        store.set("k1", "v1").await.unwrap();
        let values = store
            .get_many(&["k1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("v1".to_string()), None]);
    }

    #[tokio::test]
    async fn test_json_helpers_report_corrupt_key() {
        let store = MemoryStore::new();
        set_json(&store, "n", &vec![1, 2, 3]).await.unwrap();
        let back: Option<Vec<i32>> = get_json(&store, "n").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        store.set("bad", "{not json").await.unwrap();
        let err = get_json::<Vec<i32>>(&store, "bad").await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "bad"));
    }
}
