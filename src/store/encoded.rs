//! Typed view over a raw string backend.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CounterStore;
use crate::error::StoreError;

/// Stores typed values as JSON in a raw `CounterStore<String>` backend.
///
/// Every key is prefixed with `namespace`, which lets several logical stores
/// share one backend without reading each other's values.
pub struct EncodedStore<V> {
    backend: Arc<dyn CounterStore<String>>,
    namespace: String,
    _value: PhantomData<fn() -> V>,
}

impl<V> EncodedStore<V> {
    /// Wrap `backend`, prefixing keys with `namespace`.
    pub fn new(backend: Arc<dyn CounterStore<String>>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            _value: PhantomData,
        }
    }

    /// The key actually written to the backend.
    pub fn backend_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl<V> CounterStore<V> for EncodedStore<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let backend_key = self.backend_key(key);
        match self.backend.get(&backend_key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: backend_key,
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        let backend_key = self.backend_key(key);
        let raw = serde_json::to_string(&value).map_err(|source| StoreError::Encode {
            key: backend_key.clone(),
            source,
        })?;
        self.backend.set(&backend_key, raw).await
    }
}
