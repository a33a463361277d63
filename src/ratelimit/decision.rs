//! Outcome of an admission decision.

use std::time::Duration;

/// What the gate should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request
    Admit,
    /// Over the window allowance; retry once the window closes
    Throttled {
        retry_after: Duration,
        /// Strikes held by the key after this rejection
        strikes: u32,
    },
    /// Temporarily blacklisted until `retry_after` has passed
    BlacklistedTemp { retry_after: Duration },
    /// On the deny-list
    BlacklistedPerm,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }

    /// Retry hint, if this decision carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Throttled { retry_after, .. } | Decision::BlacklistedTemp { retry_after } => {
                Some(*retry_after)
            }
            Decision::Admit | Decision::BlacklistedPerm => None,
        }
    }

    /// Retry hint rounded up to whole seconds, as sent in `Retry-After`.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(ceil_secs)
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
