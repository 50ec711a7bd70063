//! Usage counters for cached adapters.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;

/// Per-adapter usage record, created and evicted together with its cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionMetrics {
    pub created_at: DateTime<Utc>,
    /// Last time the adapter was handed out or a query/error was recorded
    pub last_used: DateTime<Utc>,
    pub query_count: u64,
    pub error_count: u64,
}

impl ConnectionMetrics {
    /// Fresh record with zeroed counters.
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_used: now,
            query_count: 0,
            error_count: 0,
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_used = now;
    }

    pub(crate) fn record_query(&mut self, now: DateTime<Utc>) {
        self.query_count = self.query_count.saturating_add(1);
        self.last_used = now;
    }

    pub(crate) fn record_error(&mut self, now: DateTime<Utc>) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_used = now;
    }

    /// True when the adapter has not been used for strictly longer than `timeout`.
    ///
    /// Timeouts too large to represent never expire.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        TimeDelta::from_std(timeout)
            .is_ok_and(|timeout| now.signed_duration_since(self.last_used) > timeout)
    }

    /// True when the adapter was used within `window` of `now`.
    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.is_idle(now, window)
    }
}
