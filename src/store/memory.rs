//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::CounterStore;
use crate::error::StoreError;

/// Counter store held in process memory.
///
/// Entries are never evicted; stale windows and expired blacklist entries
/// simply stop mattering. State is local to one process, so deployments with
/// several instances need a shared backend behind an [`super::EncodedStore`].
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V> MemoryStore<V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> CounterStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store: MemoryStore<u32> = MemoryStore::new();
        assert_eq!(store.get("10.0.0.1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_replaces_value() {
        let store = MemoryStore::new();

        store.set("10.0.0.1", 1u32).await.unwrap();
        store.set("10.0.0.1", 2u32).await.unwrap();
        store.set("10.0.0.2", 7u32).await.unwrap();

        assert_eq!(store.get("10.0.0.1").await.unwrap(), Some(2));
        assert_eq!(store.get("10.0.0.2").await.unwrap(), Some(7));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.set("key", 1u64).await.unwrap();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get("key").await.unwrap(), None);
    }
}
