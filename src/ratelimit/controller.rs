//! Core admission controller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::decision::Decision;
use super::events::{AdmissionEvent, EventSink, TracingSink};
use super::lists::AccessLists;
use super::record::RequestRecord;
use super::stores::CounterStores;
use crate::config::{AdmissionConfig, StrikeMode, StrikeReset};
use crate::error::Result;

/// Decides per request whether a key is admitted, throttled or excluded.
///
/// One controller is built at startup and shared by reference with every
/// request handler. It holds no state of its own beyond configuration; all
/// per-key state lives in its [`CounterStores`].
pub struct AdmissionController {
    config: AdmissionConfig,
    lists: AccessLists,
    stores: CounterStores,
    sink: Arc<dyn EventSink>,
}

impl AdmissionController {
    /// Create a controller, rejecting degenerate thresholds.
    pub fn new(config: AdmissionConfig, stores: CounterStores) -> Result<Self> {
        config.validate()?;
        let lists = AccessLists::new(
            config.allow_list.iter().cloned(),
            config.deny_list.iter().cloned(),
        );

        debug!(
            window_ms = config.window_ms,
            threshold = config.threshold(),
            max_strikes = config.max_strikes,
            blacklist_duration_ms = config.blacklist_duration_ms,
            "Admission controller configured"
        );

        Ok(Self {
            config,
            lists,
            stores,
            sink: Arc::new(TracingSink),
        })
    }

    /// Replace the event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The configuration this controller was built with.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Decide whether a request for `key` arriving at `now_ms` is admitted.
    ///
    /// Store operations are awaited strictly in order. A failing store
    /// aborts the decision with [`crate::error::TurnstileError::Store`]; the
    /// caller chooses whether that fails open or closed.
    pub async fn decide(&self, key: &str, now_ms: u64) -> Result<Decision> {
        if self.lists.is_allowed(key) {
            trace!(key = %key, "Key is allow-listed");
            return Ok(Decision::Admit);
        }

        if let Some(expiry) = self.stores.blacklist.get(key).await? {
            if now_ms < expiry {
                trace!(key = %key, expiry = expiry, "Key is temporarily blacklisted");
                return Ok(Decision::BlacklistedTemp {
                    retry_after: Duration::from_millis(expiry - now_ms),
                });
            }
        }

        if self.lists.is_denied(key) {
            trace!(key = %key, "Key is deny-listed");
            return Ok(Decision::BlacklistedPerm);
        }

        let mut record = self
            .stores
            .requests
            .get(key)
            .await?
            .unwrap_or_else(|| RequestRecord::fresh(now_ms));
        record.observe(now_ms, self.config.window_ms);
        self.stores.requests.set(key, record).await?;

        trace!(
            key = %key,
            count = record.count,
            window_start = record.window_start,
            "Request counted"
        );

        if record.count <= self.config.threshold() {
            return Ok(Decision::Admit);
        }

        let strikes = self.strike(key, &record).await?;

        if strikes >= self.config.max_strikes {
            let until_ms = now_ms.saturating_add(self.config.blacklist_duration_ms);
            self.stores.blacklist.set(key, until_ms).await?;
            if self.config.strike_reset == StrikeReset::OnBlacklist {
                self.stores.strikes.set(key, 0).await?;
            }

            self.sink.record(&AdmissionEvent::Blacklisted {
                key: key.to_string(),
                strikes,
                until_ms,
            });

            return Ok(Decision::BlacklistedTemp {
                retry_after: self.config.blacklist_duration(),
            });
        }

        self.sink.record(&AdmissionEvent::Throttled {
            key: key.to_string(),
            strikes,
            max_strikes: self.config.max_strikes,
        });

        Ok(Decision::Throttled {
            retry_after: record.window_remaining(now_ms, self.config.window_ms),
            strikes,
        })
    }

    /// Record a strike for an over-limit request and return the key's total.
    async fn strike(&self, key: &str, record: &RequestRecord) -> Result<u32> {
        let current = self.stores.strikes.get(key).await?.unwrap_or(0);

        let counts = match self.config.strike_mode {
            StrikeMode::PerRejection => true,
            // Counts only grow within a window, so this is its first rejection.
            StrikeMode::PerWindow => record.count == self.config.threshold().saturating_add(1),
        };
        if !counts {
            return Ok(current);
        }

        let strikes = current.saturating_add(1);
        self.stores.strikes.set(key, strikes).await?;
        Ok(strikes)
    }
}
