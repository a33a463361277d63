//! Static allow and deny lists.

use std::collections::HashSet;
use tracing::warn;

/// Keys that bypass the stateful algorithm.
///
/// Built once at startup and never mutated. The allow-list wins when a key
/// appears on both lists.
#[derive(Debug, Clone, Default)]
pub struct AccessLists {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl AccessLists {
    /// Build the lists from configured keys.
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let allow: HashSet<String> = allow.into_iter().map(Into::into).collect();
        let deny: HashSet<String> = deny.into_iter().map(Into::into).collect();

        for key in allow.intersection(&deny) {
            warn!(key = %key, "Key is on both allow and deny lists, allow-list takes precedence");
        }

        Self { allow, deny }
    }

    /// Whether `key` is always admitted.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.allow.contains(key)
    }

    /// Whether `key` is always rejected.
    pub fn is_denied(&self, key: &str) -> bool {
        self.deny.contains(key)
    }
}
