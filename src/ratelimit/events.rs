//! Structured events emitted by the admission controller.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// A noteworthy admission outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// A key exceeded its window allowance.
    Throttled {
        key: String,
        strikes: u32,
        max_strikes: u32,
    },
    /// A key collected enough strikes to be excluded.
    Blacklisted {
        key: String,
        strikes: u32,
        /// Exclusion end, epoch milliseconds
        until_ms: u64,
    },
}

/// Receiver of admission events.
pub trait EventSink: Send + Sync {
    /// Handle one event. Must not block.
    fn record(&self, event: &AdmissionEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &AdmissionEvent) {
        match event {
            AdmissionEvent::Throttled {
                key,
                strikes,
                max_strikes,
            } => {
                info!(
                    key = %key,
                    strikes = strikes,
                    max_strikes = max_strikes,
                    "Rate limit exceeded"
                );
            }
            AdmissionEvent::Blacklisted {
                key,
                strikes,
                until_ms,
            } => {
                let until = DateTime::<Utc>::from_timestamp_millis(*until_ms as i64)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| until_ms.to_string());
                warn!(
                    key = %key,
                    strikes = strikes,
                    until = %until,
                    "Client temporarily blacklisted"
                );
            }
        }
    }
}
