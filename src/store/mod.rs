//! Counter storage abstraction.
//!
//! The admission controller never touches its state directly. It reads and
//! writes opaque values through [`CounterStore`], so the same algorithm runs
//! against process memory or any external key-value service.

mod encoded;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::StoreError;

pub use encoded::EncodedStore;
pub use memory::MemoryStore;

/// Key-value persistence capability used by the admission controller.
///
/// Both operations may suspend on I/O. No atomicity is promised across a
/// `get` followed by a `set`; concurrent decisions for the same key may
/// interleave and slightly over- or under-count.
///
/// A raw `CounterStore<String>` is the contract an external backend has to
/// satisfy; wrap it in an [`EncodedStore`] to hold typed values.
#[async_trait]
pub trait CounterStore<V: Send + 'static>: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: V) -> Result<(), StoreError>;
}
