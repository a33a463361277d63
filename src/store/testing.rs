//! Store doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{CounterStore, MemoryStore};
use crate::error::StoreError;

/// A store whose backend is always down.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl<V: Send + 'static> CounterStore<V> for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<V>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: V) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// An in-memory store that counts every call made against it.
#[derive(Debug)]
pub struct ProbeStore<V> {
    inner: MemoryStore<V>,
    calls: Arc<AtomicUsize>,
}

impl<V> ProbeStore<V> {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<V> CounterStore<V> for ProbeStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}
