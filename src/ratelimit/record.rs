//! Per-key fixed-window request record.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Requests counted for a key since `window_start`.
///
/// The window is fixed, not sliding: once more than `window_ms` has elapsed
/// since `window_start`, the next request opens a new window at that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Requests counted in the current window
    pub count: u32,
    /// Start of the current window, epoch milliseconds
    pub window_start: u64,
}

impl RequestRecord {
    /// A record with no requests whose window opens at `now`.
    pub fn fresh(now: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Count one request at `now`, opening a new window if the current one
    /// has run out.
    pub fn observe(&mut self, now: u64, window_ms: u64) {
        if now.saturating_sub(self.window_start) > window_ms {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count = self.count.saturating_add(1);
        }
    }

    /// Time left until the current window closes, zero if it already has.
    pub fn window_remaining(&self, now: u64, window_ms: u64) -> Duration {
        let closes_at = self.window_start.saturating_add(window_ms);
        Duration::from_millis(closes_at.saturating_sub(now))
    }
}
