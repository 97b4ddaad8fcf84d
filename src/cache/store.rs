//! Namespaced key/value storage for cached responses.

// Author: kelexine (https://github.com/kelexine)

use super::models::CacheEntry;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Storage for cache namespaces.
///
/// Implementations must make `put` atomic per key, `put_all` atomic per
/// batch and `delete` atomic per namespace: readers never observe a
/// half-written entry, a partial batch or a partially deleted namespace.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the namespace if it does not exist yet.
    async fn open(&self, namespace: &str) -> Result<()>;

    /// Look up `key`. A missing namespace is a miss, not an error.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Store `entry`, replacing any entry with the same key. Opens the namespace.
    async fn put(&self, namespace: &str, entry: CacheEntry) -> Result<()>;

    /// Store every entry or none of them.
    async fn put_all(&self, namespace: &str, entries: Vec<CacheEntry>) -> Result<()>;

    /// Drop a whole namespace. Returns whether it existed.
    async fn delete(&self, namespace: &str) -> Result<bool>;

    /// Names of all existing namespaces, sorted.
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Number of entries in a namespace (0 when missing).
    async fn len(&self, namespace: &str) -> Result<usize>;

    fn name(&self) -> &'static str;
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<BTreeMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, namespace: &str) -> Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default();
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, entry: CacheEntry) -> Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn put_all(&self, namespace: &str, entries: Vec<CacheEntry>) -> Result<()> {
        let mut namespaces = self.namespaces.write();
        let target = namespaces.entry(namespace.to_string()).or_default();
        for entry in entries {
            target.insert(entry.key.clone(), entry);
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.write().remove(namespace).is_some())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.read().keys().cloned().collect())
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|entries| entries.len())
            .unwrap_or(0))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn entry(key: &str, body: &'static str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            status: 200,
            headers: Vec::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let store = MemoryStore::new();
        store.put("ns", entry("http://a/x", "one")).await.unwrap();
        store.put("ns", entry("http://a/x", "two")).await.unwrap();

        let stored = store.get("ns", "http://a/x").await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"two"));
        assert_eq!(store.len("ns").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_namespace_is_a_miss() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope", "http://a/").await.unwrap(), None);
        assert_eq!(store.len("nope").await.unwrap(), 0);
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.put("a", entry("http://a/x", "one")).await.unwrap();
        store.open("b").await.unwrap();

        assert!(store.get("b", "http://a/x").await.unwrap().is_none());
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["a", "b"]);

        assert!(store.delete("a").await.unwrap());
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["b"]);
    }
}
