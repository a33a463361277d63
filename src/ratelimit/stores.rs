//! The three counter stores consumed by the admission controller.

use std::sync::Arc;

use super::record::RequestRecord;
use crate::store::{CounterStore, EncodedStore, MemoryStore};

/// Independent stores for request records, strike counts and blacklist
/// expiries.
///
/// All three are keyed by the client key, but hold different value shapes
/// and must never share a keyspace.
#[derive(Clone)]
pub struct CounterStores {
    /// Fixed-window request records
    pub requests: Arc<dyn CounterStore<RequestRecord>>,
    /// Strike counts
    pub strikes: Arc<dyn CounterStore<u32>>,
    /// Temporary blacklist expiries, epoch milliseconds
    pub blacklist: Arc<dyn CounterStore<u64>>,
}

impl CounterStores {
    /// Namespace of request records in a shared backend.
    pub const REQUESTS_NAMESPACE: &'static str = "requests:";
    /// Namespace of strike counts in a shared backend.
    pub const STRIKES_NAMESPACE: &'static str = "strikes:";
    /// Namespace of blacklist expiries in a shared backend.
    pub const BLACKLIST_NAMESPACE: &'static str = "blacklist:";

    /// Three independent in-process stores.
    pub fn in_memory() -> Self {
        Self {
            requests: Arc::new(MemoryStore::<RequestRecord>::new()),
            strikes: Arc::new(MemoryStore::<u32>::new()),
            blacklist: Arc::new(MemoryStore::<u64>::new()),
        }
    }

    /// Three namespaced views over one raw backend.
    pub fn encoded(backend: Arc<dyn CounterStore<String>>) -> Self {
        Self {
            requests: Arc::new(EncodedStore::<RequestRecord>::new(
                backend.clone(),
                Self::REQUESTS_NAMESPACE,
            )),
            strikes: Arc::new(EncodedStore::<u32>::new(
                backend.clone(),
                Self::STRIKES_NAMESPACE,
            )),
            blacklist: Arc::new(EncodedStore::<u64>::new(
                backend,
                Self::BLACKLIST_NAMESPACE,
            )),
        }
    }
}

impl Default for CounterStores {
    fn default() -> Self {
        Self::in_memory()
    }
}
